//! # Navigation
//!
//! This module provides GPS navigation of the car across a [`GridMap`](crate::map::GridMap).
//!
//! Navigation happens in two stages:
//! - [`PathPlanner`] - plans a path through the map between the car's position and the
//!   destination using A*, and reduces it to the points where the car has to change direction.
//! - [`WaypointNavigator`] - drives the car from turn point to turn point using GPS fixes, issuing
//!   commands to the drive state machine.

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

mod path_planner;
mod waypoint;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use path_planner::{
    Endpoint, GridPath, PathPlanner, PathPlannerParams, PathPlannerReport, PlanError,
    PlannedRoute,
};
pub use waypoint::{NavOutcome, WaypointNavigator, WaypointParams};

use crate::drive::SinkClosed;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("A navigation or free roam session is already running")]
    AlreadyRunning,

    #[error("The destination is outside the map's bounding box")]
    DestinationOutsideBbox,

    #[error("Couldn't get a GPS fix inside the bounding box to start from")]
    NoOriginFix,

    #[error("Couldn't plan a path to the destination: {0}")]
    Plan(#[from] PlanError),

    #[error("The drive state machine is no longer accepting commands")]
    DriveClosed,

    #[error("The car's devices were lost when a control thread panicked")]
    DevicesUnavailable,
}

impl From<SinkClosed> for NavError {
    fn from(_: SinkClosed) -> Self {
        NavError::DriveClosed
    }
}
