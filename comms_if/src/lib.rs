//! # Communications interface crate.
//!
//! Provides the interfaces shared between the car's control core and the equipment (GPS, distance
//! meter, pan servo, motors) and command sources around it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommands and navigation commands
pub mod tc;

/// Equipment traits and the data they exchange
pub mod eqpt;
