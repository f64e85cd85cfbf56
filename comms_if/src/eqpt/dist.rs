//! # Distance Meter Equipment Interface

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while measuring a distance.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    #[error("The echo was not received before the timeout")]
    Timeout,

    #[error("The meter returned an invalid reading ({0})")]
    InvalidReading(f64),

    #[error("Distance meter device error: {0}")]
    Device(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A distance meter, for example an ultrasonic ping/echo sensor.
pub trait DistanceMeter: Send {
    /// Measure the distance to the nearest object in front of the meter, in centimetres.
    ///
    /// A negative value is an invalid reading and shall be treated the same as an error.
    fn measure(&mut self) -> Result<f64, MeterError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: DistanceMeter + ?Sized> DistanceMeter for Box<T> {
    fn measure(&mut self) -> Result<f64, MeterError> {
        (**self).measure()
    }
}
