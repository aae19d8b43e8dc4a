//! Protection claims emitted for structures flagged `build_protected`.

use nebula_math::Cuboid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandClaim {
    pub area: Cuboid,
    pub protection_level: i32,
    pub description: String,
    /// Code of the structure that produced the claim.
    pub structure: String,
}
