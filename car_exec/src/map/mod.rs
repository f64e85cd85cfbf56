//! # Map
//!
//! This module implements the static occupancy [`GridMap`] the path planner searches, along with
//! the [`GridCell`] index type used to address it.

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

/// Main [`GridMap`] implementation
mod grid_map;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use grid_map::{CellState, GridCell, GridMap, GridMapError, BLOCKED_CHAR};
