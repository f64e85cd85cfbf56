//! Utility library for the robot car software

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cancel;
pub mod host;
pub mod logger;
pub mod maths;
pub mod params;
pub mod session;
pub mod track_log;

// ---------------------------------------------------------------------------
// REEXPORTS
// ---------------------------------------------------------------------------

pub use comms_if;
