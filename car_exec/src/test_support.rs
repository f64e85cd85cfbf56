//! Scripted and spying implementations of the equipment traits for unit tests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use comms_if::{
    eqpt::{
        ActuatorError, DistanceMeter, GeoPoint, GpsError, GpsSource, MeterError, PanServo,
        ServoError, VehicleActuator,
    },
    tc::NavCommand,
};

use crate::{
    drive::{CommandSink, DriveParams, SinkClosed},
    nav::WaypointParams,
    scan::ScanParams,
};

// ------------------------------------------------------------------------------------------------
// PARAMETERS
// ------------------------------------------------------------------------------------------------

pub fn fast_scan_params() -> ScanParams {
    ScanParams {
        wide_settle_ms: 0,
        read_retry_ms: 0,
        centre_settle_ms: 0,
        ahead_settle_ms: 1,
        ..ScanParams::default()
    }
}

pub fn fast_drive_params() -> DriveParams {
    DriveParams {
        stop_settle_ms: 1,
        backward_ms: 1,
        turn_settle_ms: 1,
        forward_settle_ms: 1,
        watchdog_send_retry_ms: 1,
        ..DriveParams::default()
    }
}

pub fn fast_waypoint_params() -> WaypointParams {
    WaypointParams {
        control_tick_ms: 1,
        gps_retry_ms: 1,
        ..WaypointParams::default()
    }
}

// ------------------------------------------------------------------------------------------------
// GPS
// ------------------------------------------------------------------------------------------------

/// Returns the scripted fixes in order, then repeats the last one forever.
pub struct ScriptedGps {
    script: VecDeque<Result<GeoPoint, GpsError>>,
    last: Option<GeoPoint>,
}

impl ScriptedGps {
    pub fn new(script: Vec<Result<GeoPoint, GpsError>>) -> Self {
        Self {
            script: script.into(),
            last: None,
        }
    }
}

impl GpsSource for ScriptedGps {
    fn read_fix(&mut self) -> Result<GeoPoint, GpsError> {
        match self.script.pop_front() {
            Some(Ok(fix)) => {
                self.last = Some(fix);
                Ok(fix)
            }
            Some(Err(e)) => {
                self.last = None;
                Err(e)
            }
            None => self.last.ok_or(GpsError::NoFix),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// METERS AND SERVOS
// ------------------------------------------------------------------------------------------------

/// Returns the scripted readings in order, then the default reading forever.
pub struct ScriptedMeter {
    script: VecDeque<Result<f64, MeterError>>,
    default: Option<f64>,
}

impl ScriptedMeter {
    pub fn new(script: Vec<Result<f64, MeterError>>, default: f64) -> Self {
        Self {
            script: script.into(),
            default: Some(default),
        }
    }

    /// A meter which never gives a reading.
    pub fn failing() -> Self {
        Self {
            script: VecDeque::new(),
            default: None,
        }
    }
}

impl DistanceMeter for ScriptedMeter {
    fn measure(&mut self) -> Result<f64, MeterError> {
        match self.script.pop_front() {
            Some(r) => r,
            None => self.default.ok_or(MeterError::Timeout),
        }
    }
}

/// Records every angle it is set to.
pub struct SpyServo {
    angles: Arc<Mutex<Vec<f64>>>,
    angle: Arc<Mutex<f64>>,
}

impl SpyServo {
    pub fn new() -> Self {
        Self {
            angles: Arc::new(Mutex::new(Vec::new())),
            angle: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Every angle set so far.
    pub fn angles(&self) -> Arc<Mutex<Vec<f64>>> {
        self.angles.clone()
    }

    /// The current angle.
    pub fn angle(&self) -> Arc<Mutex<f64>> {
        self.angle.clone()
    }
}

impl PanServo for SpyServo {
    fn set_angle(&mut self, degrees: f64) -> Result<(), ServoError> {
        self.angles.lock().unwrap().push(degrees);
        *self.angle.lock().unwrap() = degrees;
        Ok(())
    }
}

/// A meter whose reading depends on where a [`SpyServo`] is pointing.
pub struct AngleMeter {
    angle: Arc<Mutex<f64>>,
    reading: Box<dyn Fn(f64) -> f64 + Send>,
}

impl AngleMeter {
    pub fn new<F>(angle: Arc<Mutex<f64>>, reading: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + 'static,
    {
        Self {
            angle,
            reading: Box::new(reading),
        }
    }
}

impl DistanceMeter for AngleMeter {
    fn measure(&mut self) -> Result<f64, MeterError> {
        let angle = *self.angle.lock().unwrap();
        Ok((self.reading)(angle))
    }
}

// ------------------------------------------------------------------------------------------------
// ACTUATOR
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActCall {
    Forward,
    Backward,
    Stop,
    Turn(f64),
    Beep(u32, u32),
}

/// Records every call made to it.
pub struct SpyActuator {
    calls: Arc<Mutex<Vec<ActCall>>>,
}

impl SpyActuator {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<ActCall>>> {
        self.calls.clone()
    }

    fn record(&mut self, call: ActCall) -> Result<(), ActuatorError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl VehicleActuator for SpyActuator {
    fn forward(&mut self) -> Result<(), ActuatorError> {
        self.record(ActCall::Forward)
    }

    fn backward(&mut self) -> Result<(), ActuatorError> {
        self.record(ActCall::Backward)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.record(ActCall::Stop)
    }

    fn turn(&mut self, angle_deg: f64) -> Result<(), ActuatorError> {
        self.record(ActCall::Turn(angle_deg))
    }

    fn beep(&mut self, times: u32, interval_ms: u32) -> Result<(), ActuatorError> {
        self.record(ActCall::Beep(times, interval_ms))
    }
}

// ------------------------------------------------------------------------------------------------
// SINK
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkEvent {
    Cmd(NavCommand),
    Beep(u32, u32),
}

/// Records every command and horn request sent to it.
pub struct SpySink {
    events: Mutex<Vec<SinkEvent>>,
}

impl SpySink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CommandSink for SpySink {
    fn send(&self, cmd: NavCommand) -> Result<(), SinkClosed> {
        self.events.lock().unwrap().push(SinkEvent::Cmd(cmd));
        Ok(())
    }

    fn beep(&self, times: u32, interval_ms: u32) -> Result<(), SinkClosed> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Beep(times, interval_ms));
        Ok(())
    }
}
