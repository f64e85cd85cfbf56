//! # Vehicle Equipment Interface

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("The vehicle has no {0} fitted")]
    NotFitted(&'static str),

    #[error("Actuator device error: {0}")]
    Device(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The motors, steering and horn of the car.
pub trait VehicleActuator: Send {
    /// Start driving forwards, continuing until another motion is demanded.
    fn forward(&mut self) -> Result<(), ActuatorError>;

    /// Start driving backwards, continuing until another motion is demanded.
    fn backward(&mut self) -> Result<(), ActuatorError>;

    /// Stop all motion.
    fn stop(&mut self) -> Result<(), ActuatorError>;

    /// Turn on the spot by the given angle in degrees, negative to the left and positive to the
    /// right. How the turn is bounded (time or encoder) is up to the driver.
    fn turn(&mut self, angle_deg: f64) -> Result<(), ActuatorError>;

    /// Sound the horn `times` times, `interval_ms` apart.
    fn beep(&mut self, times: u32, interval_ms: u32) -> Result<(), ActuatorError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: VehicleActuator + ?Sized> VehicleActuator for Box<T> {
    fn forward(&mut self) -> Result<(), ActuatorError> {
        (**self).forward()
    }

    fn backward(&mut self) -> Result<(), ActuatorError> {
        (**self).backward()
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        (**self).stop()
    }

    fn turn(&mut self, angle_deg: f64) -> Result<(), ActuatorError> {
        (**self).turn(angle_deg)
    }

    fn beep(&mut self, times: u32, interval_ms: u32) -> Result<(), ActuatorError> {
        (**self).beep(times, interval_ms)
    }
}
