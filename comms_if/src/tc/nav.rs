//! # Navigation Commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt::Display;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An actuation directive for the drive state machine.
///
/// Commands carry no position information, they only say what the car should do next. They are
/// created by a producer (the waypoint navigator, the ahead scanner or the state machine itself)
/// and consumed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NavCommand {
    /// Drive forwards until superseded
    Forward,

    /// Back off away from an obstacle
    Backward,

    /// Stop the car
    Stop,

    /// Perform a wide scan to choose a new direction
    Scan,

    /// Turn by the given angle in degrees, negative to the left, positive to the right
    Turn(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NavCommand {
    /// Returns true if this command is a [`NavCommand::Turn`] of any angle.
    pub fn is_turn(&self) -> bool {
        matches!(self, NavCommand::Turn(_))
    }
}

impl Display for NavCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavCommand::Forward => write!(f, "forward"),
            NavCommand::Backward => write!(f, "backward"),
            NavCommand::Stop => write!(f, "stop"),
            NavCommand::Scan => write!(f, "scan"),
            NavCommand::Turn(a) => write!(f, "turn({:.1})", a),
        }
    }
}
