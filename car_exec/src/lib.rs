//! # Car library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to access items defined
//! inside the car crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Car controller - owns the devices and runs navigation and free roam sessions
pub mod ctrl;

/// Drive state machine - arbitrates commands and drives the actuator
pub mod drive;

/// Geographic helpers - bounding boxes, distances, angles and sides
pub mod geo;

/// Grid map - the occupancy grid planned over
pub mod map;

/// Navigation - path planning and GPS waypoint following
pub mod nav;

/// Executable parameters
pub mod params;

/// Obstacle scanner - the distance meter on its pan servo
pub mod scan;

/// Simulated car - runs everything without hardware
pub mod sim;

#[cfg(test)]
pub(crate) mod test_support;
