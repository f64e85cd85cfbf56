//! # Obstacle Scanner
//!
//! The scanner owns the distance meter and the pan servo it is mounted on. It provides two
//! behaviours:
//! - a wide scan, sweeping the meter across the front of the car to find the nearest obstacle and
//!   the most open direction,
//! - an ahead scan, a continuous narrow sweep run while the car drives forwards which reports the
//!   first obstacle that gets too close.
//!
//! Only one of these can run at once since both move the servo. This is enforced by ownership,
//! whoever holds the [`ObstacleScanner`] is the only one able to scan.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::{servo, DistanceMeter, PanServo},
    tc::NavCommand,
};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use util::{cancel::CancelToken, maths::clamp};

use crate::drive::CommandSink;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ObstacleScanner {
    params: ScanParams,
    servo: Box<dyn PanServo>,
    meter: Box<dyn DistanceMeter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParams {
    /// Servo angles visited by a wide scan, in order, in degrees
    pub wide_angles_deg: Vec<f64>,

    /// Time to let the servo settle at each wide scan angle before measuring
    pub wide_settle_ms: u64,

    /// Number of extra attempts to read the meter at a wide scan angle before skipping it
    pub read_retries: u32,

    /// Time between meter read attempts
    pub read_retry_ms: u64,

    /// Time to let the servo settle after centring it at the end of a wide scan
    pub centre_settle_ms: u64,

    /// Servo angles visited by the ahead scan, repeated until an obstacle is seen
    pub ahead_angles_deg: Vec<f64>,

    /// Time to let the servo settle at each ahead scan angle
    pub ahead_settle_ms: u64,

    /// Obstacles closer than this during an ahead scan make the car back off
    pub backward_below_cm: f64,

    /// Obstacles closer than this during an ahead scan make the car stop
    pub stop_below_cm: f64,
}

/// Result of a wide scan.
///
/// If no valid reading was made the minimum distance is `+inf` and the maximum `-inf`, with both
/// angles left at 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub min_dist_cm: f64,
    pub min_angle_deg: f64,
    pub max_dist_cm: f64,
    pub max_angle_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Why an ahead scan ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AheadScanExit {
    /// The scan was cancelled before finding anything
    Cancelled,

    /// An obstacle was found and the given command was sent
    Obstacle {
        command: NavCommand,
        dist_cm: f64,
        angle_deg: f64,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            wide_angles_deg: (-6..=6).map(|i| i as f64 * 15.0).collect(),
            wide_settle_ms: 200,
            read_retries: 3,
            read_retry_ms: 100,
            centre_settle_ms: 50,
            ahead_angles_deg: vec![0.0, -15.0, 0.0, 15.0],
            ahead_settle_ms: 100,
            backward_below_cm: 20.0,
            stop_below_cm: 40.0,
        }
    }
}

impl Default for ScanResult {
    fn default() -> Self {
        Self {
            min_dist_cm: f64::INFINITY,
            min_angle_deg: 0.0,
            max_dist_cm: f64::NEG_INFINITY,
            max_angle_deg: 0.0,
        }
    }
}

impl ScanResult {
    /// Returns true if at least one valid reading went into the result.
    pub fn has_readings(&self) -> bool {
        self.min_dist_cm.is_finite()
    }
}

impl ObstacleScanner {
    pub fn new(
        params: ScanParams,
        servo: Box<dyn PanServo>,
        meter: Box<dyn DistanceMeter>,
    ) -> Self {
        Self {
            params,
            servo,
            meter,
        }
    }

    /// Give back the devices owned by the scanner.
    pub fn into_devices(self) -> (Box<dyn PanServo>, Box<dyn DistanceMeter>) {
        (self.servo, self.meter)
    }

    /// Sweep the meter across the wide scan angles and report the nearest and furthest readings.
    ///
    /// Angles where the meter can't be read are skipped. If the token is cancelled the sweep stops
    /// early and the readings made so far are returned. The servo is always centred at the end.
    pub fn wide_scan(&mut self, cancel: &CancelToken) -> ScanResult {
        let mut result = ScanResult::default();

        for i in 0..self.params.wide_angles_deg.len() {
            let angle = self.params.wide_angles_deg[i];

            self.point(angle);
            if !cancel.sleep_ms(self.params.wide_settle_ms) {
                break;
            }

            let dist = match self.read_with_retries(cancel) {
                Some(d) => d,
                None => {
                    debug!("Wide scan: no reading at {:.0} deg", angle);
                    continue;
                }
            };

            debug!("Wide scan: {:.0} cm at {:.0} deg", dist, angle);

            if dist < result.min_dist_cm {
                result.min_dist_cm = dist;
                result.min_angle_deg = angle;
            }
            if dist > result.max_dist_cm {
                result.max_dist_cm = dist;
                result.max_angle_deg = angle;
            }
        }

        self.point(0.0);
        cancel.sleep_ms(self.params.centre_settle_ms);

        if result.has_readings() {
            info!(
                "Wide scan: min {:.0} cm at {:.0} deg, max {:.0} cm at {:.0} deg",
                result.min_dist_cm, result.min_angle_deg, result.max_dist_cm, result.max_angle_deg
            );
        } else {
            warn!("Wide scan finished without a single valid reading");
        }

        result
    }

    /// Continuously sweep the ahead angles until an obstacle comes too close or the token is
    /// cancelled.
    ///
    /// Closer than `backward_below_cm` sends [`NavCommand::Backward`] to the sink, closer than
    /// `stop_below_cm` sends [`NavCommand::Stop`]. Either way the scan ends after sending.
    pub fn ahead_scan_loop(
        &mut self,
        cancel: &CancelToken,
        sink: &dyn CommandSink,
    ) -> AheadScanExit {
        if self.params.ahead_angles_deg.is_empty() {
            warn!("No ahead scan angles set, obstacles won't be detected while driving");
            while cancel.sleep_ms(self.params.ahead_settle_ms.max(1)) {}
            return AheadScanExit::Cancelled;
        }

        loop {
            for i in 0..self.params.ahead_angles_deg.len() {
                let angle = self.params.ahead_angles_deg[i];

                if cancel.is_cancelled() {
                    return AheadScanExit::Cancelled;
                }

                self.point(angle);
                if !cancel.sleep_ms(self.params.ahead_settle_ms) {
                    return AheadScanExit::Cancelled;
                }

                let dist = match self.read_with_retries(cancel) {
                    Some(d) => d,
                    None => continue,
                };

                trace!("Ahead scan: {:.0} cm at {:.0} deg", dist, angle);

                let command = if dist < self.params.backward_below_cm {
                    NavCommand::Backward
                } else if dist < self.params.stop_below_cm {
                    NavCommand::Stop
                } else {
                    continue;
                };

                info!(
                    "Obstacle {:.0} cm ahead at {:.0} deg, requesting {}",
                    dist, angle, command
                );

                if let Err(e) = sink.send(command) {
                    warn!("Couldn't send {} from the ahead scan: {}", command, e);
                }

                return AheadScanExit::Obstacle {
                    command,
                    dist_cm: dist,
                    angle_deg: angle,
                };
            }
        }
    }

    /// Point the meter at the given angle.
    fn point(&mut self, angle_deg: f64) {
        let angle_deg = clamp(&angle_deg, &servo::MIN_ANGLE_DEG, &servo::MAX_ANGLE_DEG);

        if let Err(e) = self.servo.set_angle(angle_deg) {
            warn!("Couldn't move the scan servo to {:.0} deg: {}", angle_deg, e);
        }
    }

    /// Make a single reading, returning `None` if it isn't valid.
    fn read(&mut self) -> Option<f64> {
        match self.meter.measure() {
            Ok(d) if d >= 0.0 => Some(d),
            Ok(d) => {
                trace!("Invalid distance reading: {}", d);
                None
            }
            Err(e) => {
                trace!("Distance meter error: {}", e);
                None
            }
        }
    }

    /// Read the meter, retrying on invalid readings.
    fn read_with_retries(&mut self, cancel: &CancelToken) -> Option<f64> {
        let mut reading = self.read();
        let mut retries = 0;

        while reading.is_none() && retries < self.params.read_retries {
            if !cancel.sleep_ms(self.params.read_retry_ms) {
                return None;
            }
            reading = self.read();
            retries += 1;
        }

        reading
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
