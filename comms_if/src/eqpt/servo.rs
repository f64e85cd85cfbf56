//! # Pan Servo Equipment Interface

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Minimum angle a pan servo can be commanded to, in degrees.
pub const MIN_ANGLE_DEG: f64 = -90.0;

/// Maximum angle a pan servo can be commanded to, in degrees.
pub const MAX_ANGLE_DEG: f64 = 90.0;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    #[error("Servo angle {0} is outside the range [-90, 90] degrees")]
    OutOfRange(f64),

    #[error("Servo device error: {0}")]
    Device(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A servo which pans the distance meter left and right.
pub trait PanServo: Send {
    /// Command the servo to the given angle in degrees, 0 being straight ahead, negative to the
    /// left and positive to the right.
    ///
    /// The call returns once the demand is sent, the caller must wait for the servo to settle.
    fn set_angle(&mut self, degrees: f64) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: PanServo + ?Sized> PanServo for Box<T> {
    fn set_angle(&mut self, degrees: f64) -> Result<(), ServoError> {
        (**self).set_angle(degrees)
    }
}
