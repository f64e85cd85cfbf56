//! # Equipment Interface
//!
//! This module defines the traits the car's equipment must implement to be driven by the control
//! core. Concrete drivers (GPIO, serial, PWM) live outside this workspace, the control core only
//! ever sees these capabilities.
//!
//! Each trait is implemented for `Box<T>` so that boxed trait objects can be handed to anything
//! generic over the trait.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// GPS receiver interface and the [`GeoPoint`] type
pub mod gps;

/// Ultrasonic/laser distance meter interface
pub mod dist;

/// Pan servo interface
pub mod servo;

/// Motor, steering and horn interface
pub mod vehicle;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use dist::{DistanceMeter, MeterError};
pub use gps::{GeoPoint, GpsError, GpsSource};
pub use servo::{PanServo, ServoError};
pub use vehicle::{ActuatorError, VehicleActuator};
