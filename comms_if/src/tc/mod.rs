//! # Telecommand module
//!
//! Commands flowing into the car: [`NavCommand`]s consumed by the drive state machine, and
//! [`CarCmd`]s which select what the car as a whole should be doing.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuation directives for the drive state machine
pub mod nav;

/// High level car commands
pub mod car;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use car::CarCmd;
pub use nav::NavCommand;
