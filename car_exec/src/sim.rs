//! # Simulated Car
//!
//! A software model of the car used when running without hardware. The [`SimWorld`] tracks the
//! car's position and heading inside the map's bounding box, moving it at a constant speed while
//! it is driving. The simulated devices all share the world:
//! - the GPS reports the exact position,
//! - the distance meter raycasts from the car along the servo direction, stopping at blocked map
//!   cells or the edge of the bounding box,
//! - the actuator starts and stops motion and turns on the spot.
//!
//! Motion is integrated lazily from wall clock time whenever a device touches the world.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use comms_if::eqpt::{
    servo, ActuatorError, DistanceMeter, GeoPoint, GpsError, GpsSource, MeterError, PanServo,
    ServoError, VehicleActuator,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use util::maths::wrap_deg_180;

use crate::{ctrl::CarDevices, geo::EARTH_RADIUS_M, map::GridMap};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest distance moved in one integration step, so that the car can't skip over a thin wall.
const MAX_STEP_M: f64 = 0.05;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    /// Starting position of the car
    pub start: GeoPoint,

    /// Starting heading in degrees clockwise from north
    pub start_heading_deg: f64,

    /// Driving speed, both forwards and backwards
    pub speed_m_s: f64,

    /// Longest distance the meter can measure, returned when nothing is in range
    pub meter_max_range_cm: f64,

    /// Resolution of the meter's raycast
    pub meter_step_cm: f64,
}

/// The simulated world shared by all simulated devices.
pub struct SimWorld {
    params: SimParams,
    map: GridMap,

    position: GeoPoint,
    heading_deg: f64,
    motion: Motion,
    servo_deg: f64,
    num_beeps: u32,

    last_update: Instant,
}

pub type SharedWorld = Arc<Mutex<SimWorld>>;

pub struct SimGps(SharedWorld);
pub struct SimActuator(SharedWorld);
pub struct SimServo(SharedWorld);
pub struct SimMeter(SharedWorld);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Stopped,
    Forward,
    Backward,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            start: GeoPoint::default(),
            start_heading_deg: 0.0,
            speed_m_s: 0.5,
            meter_max_range_cm: 400.0,
            meter_step_cm: 1.0,
        }
    }
}

impl SimWorld {
    pub fn new(params: SimParams, map: GridMap) -> Self {
        if !map.bbox().contains(&params.start) {
            warn!(
                "Simulated car starts at ({}), outside the map's bounding box",
                params.start
            );
        }

        Self {
            position: params.start,
            heading_deg: wrap_deg_180(params.start_heading_deg),
            motion: Motion::Stopped,
            servo_deg: 0.0,
            num_beeps: 0,
            last_update: Instant::now(),
            params,
            map,
        }
    }

    /// Wrap the world up to be shared between devices.
    pub fn into_shared(self) -> SharedWorld {
        Arc::new(Mutex::new(self))
    }

    /// Build the full set of car devices around a shared world.
    pub fn devices(world: &SharedWorld) -> CarDevices {
        CarDevices {
            gps: Box::new(SimGps(world.clone())),
            actuator: Box::new(SimActuator(world.clone())),
            servo: Box::new(SimServo(world.clone())),
            meter: Box::new(SimMeter(world.clone())),
        }
    }

    pub fn position(&mut self) -> GeoPoint {
        self.update();
        self.position
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_deg
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    pub fn num_beeps(&self) -> u32 {
        self.num_beeps
    }

    /// Returns true if the car may occupy the given point.
    pub fn is_passable(&self, point: &GeoPoint) -> bool {
        self.map.bbox().contains(point) && self.map.is_free(&self.map.geo_to_xy(point))
    }

    /// Distance in cm to the first obstacle along the given bearing, capped at the meter's range.
    pub fn raycast_cm(&self, bearing_deg: f64) -> f64 {
        let step = self.params.meter_step_cm.max(0.1);
        let mut dist_cm = step;

        while dist_cm < self.params.meter_max_range_cm {
            let point = offset(&self.position, bearing_deg, dist_cm / 100.0);
            if !self.is_passable(&point) {
                return dist_cm;
            }
            dist_cm += step;
        }

        self.params.meter_max_range_cm
    }

    /// Move the car along its heading for the time elapsed since the last update.
    fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        let sign = match self.motion {
            Motion::Stopped => return,
            Motion::Forward => 1.0,
            Motion::Backward => -1.0,
        };

        let mut remaining_m = self.params.speed_m_s * dt;

        while remaining_m > 0.0 {
            let step_m = remaining_m.min(MAX_STEP_M);
            let next = offset(&self.position, self.heading_deg, sign * step_m);

            if !self.is_passable(&next) {
                warn!("Simulated car bumped into an obstacle at ({})", next);
                self.motion = Motion::Stopped;
                return;
            }

            self.position = next;
            remaining_m -= step_m;
        }
    }

    fn set_motion(&mut self, motion: Motion) {
        self.update();
        self.motion = motion;
    }
}

impl GpsSource for SimGps {
    fn read_fix(&mut self) -> Result<GeoPoint, GpsError> {
        let mut world = lock(&self.0).map_err(GpsError::Device)?;
        Ok(world.position())
    }
}

impl VehicleActuator for SimActuator {
    fn forward(&mut self) -> Result<(), ActuatorError> {
        lock(&self.0)
            .map_err(ActuatorError::Device)?
            .set_motion(Motion::Forward);
        Ok(())
    }

    fn backward(&mut self) -> Result<(), ActuatorError> {
        lock(&self.0)
            .map_err(ActuatorError::Device)?
            .set_motion(Motion::Backward);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        lock(&self.0)
            .map_err(ActuatorError::Device)?
            .set_motion(Motion::Stopped);
        Ok(())
    }

    fn turn(&mut self, angle_deg: f64) -> Result<(), ActuatorError> {
        let mut world = lock(&self.0).map_err(ActuatorError::Device)?;

        // Turns are on the spot
        world.set_motion(Motion::Stopped);
        world.heading_deg = wrap_deg_180(world.heading_deg + angle_deg);

        debug!(
            "Simulated car turned {:.1} deg, now heading {:.1} deg",
            angle_deg, world.heading_deg
        );

        Ok(())
    }

    fn beep(&mut self, times: u32, interval_ms: u32) -> Result<(), ActuatorError> {
        let mut world = lock(&self.0).map_err(ActuatorError::Device)?;
        world.num_beeps += times;

        info!("Beep x{} ({} ms)", times, interval_ms);

        Ok(())
    }
}

impl PanServo for SimServo {
    fn set_angle(&mut self, degrees: f64) -> Result<(), ServoError> {
        if !(servo::MIN_ANGLE_DEG..=servo::MAX_ANGLE_DEG).contains(&degrees) {
            return Err(ServoError::OutOfRange(degrees));
        }

        lock(&self.0).map_err(ServoError::Device)?.servo_deg = degrees;

        Ok(())
    }
}

impl DistanceMeter for SimMeter {
    fn measure(&mut self) -> Result<f64, MeterError> {
        let mut world = lock(&self.0).map_err(MeterError::Device)?;
        world.update();

        let bearing = world.heading_deg + world.servo_deg;
        Ok(world.raycast_cm(bearing))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock(world: &SharedWorld) -> Result<MutexGuard<'_, SimWorld>, String> {
    world
        .lock()
        .map_err(|_| String::from("simulation state is poisoned"))
}

/// The point `dist_m` away from `point` along the given bearing (degrees clockwise from north).
fn offset(point: &GeoPoint, bearing_deg: f64, dist_m: f64) -> GeoPoint {
    let bearing = bearing_deg.to_radians();
    let d_lat = dist_m * bearing.cos() / EARTH_RADIUS_M;
    let d_lon = dist_m * bearing.sin() / (EARTH_RADIUS_M * point.lat.to_radians().cos());

    GeoPoint::new(point.lat + d_lat.to_degrees(), point.lon + d_lon.to_degrees())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
