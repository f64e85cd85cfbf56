//! # Car Executable Parameters
//!
//! This module provides parameters for the car executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{geo::BoundingBox, sim::SimParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarExecParams {
    /// Path of the map text file, relative to the params directory
    pub map_file: String,

    /// Geographic area covered by the map
    pub bbox: BoundingBox,

    /// Size of one map cell in degrees
    pub cell_size_deg: f64,

    /// The simulated car driven by the executable
    pub sim: SimParams,
}
