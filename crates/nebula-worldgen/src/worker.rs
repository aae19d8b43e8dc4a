//! Terrain pass on a worker thread pool.
//!
//! Only the terrain pass runs here: it touches one column and the shared
//! region lattices. Feature passes read neighbouring columns and run on the
//! thread that owns the [`nebula_voxel::ColumnStore`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use dashmap::DashMap;
use nebula_terrain::StrataReport;
use nebula_voxel::{ChunkColumn, ColumnPos};

use crate::error::WorldGenError;
use crate::pipeline::TerrainPipeline;

/// A request to run the terrain pass for one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnTask {
    pub pos: ColumnPos,
}

/// A column that finished the terrain pass.
#[derive(Debug)]
pub struct GeneratedColumn {
    pub column: ChunkColumn,
    pub strata: StrataReport,
    /// Generation time in microseconds.
    pub generation_time_us: u64,
}

struct QueuedTask {
    task: ColumnTask,
    cancelled: Arc<AtomicBool>,
}

/// Runs the terrain pass across a fixed pool of named threads.
///
/// Results come back on a bounded channel; one thread is expected to drain
/// them. Dropping the generator closes the task channel and lets the workers
/// exit once the queue is empty.
pub struct AsyncColumnGenerator {
    task_sender: Sender<QueuedTask>,
    result_receiver: Receiver<GeneratedColumn>,
    active_tasks: Arc<DashMap<ColumnPos, Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
    thread_count: usize,
}

impl AsyncColumnGenerator {
    /// Spawns `thread_count` workers (at least one).
    ///
    /// # Errors
    ///
    /// [`WorldGenError::WorkerSpawn`] if the OS refuses a thread.
    pub fn new(
        pipeline: Arc<TerrainPipeline>,
        thread_count: usize,
        max_in_flight: usize,
        result_capacity: usize,
    ) -> Result<Self, WorldGenError> {
        let thread_count = thread_count.max(1);
        let (task_sender, task_receiver) = bounded::<QueuedTask>(max_in_flight.max(1));
        let (result_sender, result_receiver) = bounded::<GeneratedColumn>(result_capacity.max(1));
        let in_flight = Arc::new(AtomicU64::new(0));

        for i in 0..thread_count {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let in_flight = Arc::clone(&in_flight);
            let pipeline = Arc::clone(&pipeline);

            std::thread::Builder::new()
                .name(format!("worldgen-worker-{i}"))
                .spawn(move || {
                    while let Ok(queued) = receiver.recv() {
                        if queued.cancelled.load(Ordering::Relaxed) {
                            in_flight.fetch_sub(1, Ordering::Relaxed);
                            continue;
                        }

                        let start = Instant::now();
                        let (column, strata) = pipeline.generate_column(queued.task.pos);
                        let elapsed = start.elapsed().as_micros() as u64;

                        if !queued.cancelled.load(Ordering::Relaxed) {
                            let _ = sender.send(GeneratedColumn {
                                column,
                                strata,
                                generation_time_us: elapsed,
                            });
                        }
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })?;
        }
        tracing::debug!("Started {thread_count} world generation workers");

        Ok(Self {
            task_sender,
            result_receiver,
            active_tasks: Arc::new(DashMap::new()),
            in_flight,
            thread_count,
        })
    }

    /// Queues a column. Returns the task back if the queue is full.
    pub fn submit(&self, task: ColumnTask) -> Result<(), ColumnTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_tasks.insert(task.pos, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        self.task_sender
            .try_send(QueuedTask { task, cancelled })
            .map_err(|e| {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                let task = e.into_inner().task;
                self.active_tasks.remove(&task.pos);
                task
            })
    }

    /// Cancels a queued or running task. A finished task is unaffected.
    pub fn cancel(&self, pos: ColumnPos) {
        if let Some((_, cancelled)) = self.active_tasks.remove(&pos) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Every result available right now.
    pub fn drain_results(&self) -> Vec<GeneratedColumn> {
        let mut results = Vec::new();
        while let Ok(done) = self.result_receiver.try_recv() {
            self.active_tasks.remove(&done.column.pos());
            results.push(done);
        }
        results
    }

    /// Blocks for the next result, up to `timeout`.
    pub fn wait_result(&self, timeout: Duration) -> Option<GeneratedColumn> {
        let done = self.result_receiver.recv_timeout(timeout).ok()?;
        self.active_tasks.remove(&done.column.pos());
        Some(done)
    }

    /// Tasks queued or executing.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn is_pending(&self, pos: ColumnPos) -> bool {
        self.active_tasks.contains_key(&pos)
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use nebula_voxel::GenPass;

    fn collect(generator: &AsyncColumnGenerator, expected: usize) -> Vec<GeneratedColumn> {
        let mut results = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(60);
        while results.len() < expected && Instant::now() < deadline {
            if let Some(done) = generator.wait_result(Duration::from_millis(50)) {
                results.push(done);
            }
        }
        results
    }

    #[test]
    fn test_workers_return_every_submitted_column() {
        let context = test_context(7);
        let generator = AsyncColumnGenerator::new(context.terrain(), 3, 16, 16).unwrap();

        let mut submitted = 0;
        for x in 0..3 {
            for z in 0..2 {
                if generator.submit(ColumnTask { pos: ColumnPos::new(x, z) }).is_ok() {
                    submitted += 1;
                }
            }
        }
        let results = collect(&generator, submitted);
        assert_eq!(results.len(), submitted);
        assert!(results.iter().all(|r| r.column.has_completed(GenPass::Terrain)));
    }

    #[test]
    fn test_worker_columns_match_caller_columns() {
        let context = test_context(11);
        let generator = AsyncColumnGenerator::new(context.terrain(), 2, 8, 8).unwrap();
        let pos = ColumnPos::new(-2, 5);
        generator.submit(ColumnTask { pos }).unwrap();

        let results = collect(&generator, 1);
        assert_eq!(results.len(), 1);
        let (expected, report) = context.terrain().generate_column(pos);
        assert_eq!(results[0].column, expected);
        assert_eq!(results[0].strata, report);
    }

    #[test]
    fn test_full_queue_hands_task_back() {
        let context = test_context(3);
        let generator = AsyncColumnGenerator::new(context.terrain(), 1, 1, 1).unwrap();
        let mut rejected = None;
        for x in 0..8 {
            if let Err(task) = generator.submit(ColumnTask { pos: ColumnPos::new(x, 0) }) {
                rejected = Some(task);
                break;
            }
        }
        let task = rejected.expect("a one-slot queue must fill up");
        assert!(!generator.is_pending(task.pos));
    }

    #[test]
    fn test_in_flight_count_drains_to_zero() {
        let context = test_context(5);
        let generator = AsyncColumnGenerator::new(context.terrain(), 2, 8, 8).unwrap();
        for x in 0..4 {
            let _ = generator.submit(ColumnTask { pos: ColumnPos::new(x, 1) });
        }
        let _ = collect(&generator, 4);
        let deadline = Instant::now() + Duration::from_secs(10);
        while generator.in_flight_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(generator.in_flight_count(), 0);
    }
}
