//! Waypoint navigator
//!
//! Drives the car through a list of geographic legs using GPS fixes. Each control tick the
//! navigator compares the direction the car moved in since the previous fix with the direction to
//! the current leg, and asks the drive state machine to turn by the difference.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::{GeoPoint, GpsSource},
    tc::NavCommand,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use util::{cancel::CancelToken, track_log::TrackLogger};

use crate::{
    drive::CommandSink,
    geo::{self, BoundingBox, Side},
};

use super::NavError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointParams {
    /// A leg is complete when the car is closer than this to its end
    pub arrive_radius_m: f64,

    /// Fixes further than this from the previous fix are treated as GPS noise
    pub max_fix_jump_m: f64,

    /// Number of noisy fixes in a row to reject before accepting one anyway
    pub max_bad_fix_retries: u32,

    /// Heading errors smaller than this are not corrected
    pub aligned_angle_deg: f64,

    /// Time between steering decisions
    pub control_tick_ms: u64,

    /// Time to wait after a failed or rejected fix before reading again
    pub gps_retry_ms: u64,
}

/// Drives the car through a list of legs using GPS.
pub struct WaypointNavigator {
    params: WaypointParams,
    bbox: BoundingBox,
    gps: Box<dyn GpsSource>,
    cancel: CancelToken,
    track_log: Option<TrackLogger>,

    /// The last accepted fix
    last_fix: GeoPoint,

    /// Number of noisy fixes rejected in a row
    bad_fix_retries: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How a navigation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavOutcome {
    /// Every leg was completed
    Arrived,

    /// The navigation was cancelled before reaching the destination
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegOutcome {
    Reached,
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for WaypointParams {
    fn default() -> Self {
        Self {
            arrive_radius_m: 4.0,
            max_fix_jump_m: 4.0,
            max_bad_fix_retries: 5,
            aligned_angle_deg: 10.0,
            control_tick_ms: 1000,
            gps_retry_ms: 1000,
        }
    }
}

impl WaypointNavigator {
    /// Create a new navigator starting from the given origin fix.
    pub fn new(
        params: WaypointParams,
        bbox: BoundingBox,
        gps: Box<dyn GpsSource>,
        origin: GeoPoint,
        cancel: CancelToken,
    ) -> Self {
        Self {
            params,
            bbox,
            gps,
            cancel,
            track_log: None,
            last_fix: origin,
            bad_fix_retries: 0,
        }
    }

    /// Record every accepted fix into the given track log.
    pub fn with_track_log(mut self, track_log: TrackLogger) -> Self {
        self.track_log = Some(track_log);
        self
    }

    /// Give back the GPS receiver. Dropping the navigator closes the track log.
    pub fn into_gps(self) -> Box<dyn GpsSource> {
        self.gps
    }

    /// Drive through each leg in turn, ending stopped at the last one.
    ///
    /// Returns [`NavOutcome::Cancelled`] as soon as the navigator's token is cancelled, after
    /// stopping the car.
    pub fn run(
        &mut self,
        legs: &[GeoPoint],
        sink: &dyn CommandSink,
    ) -> Result<NavOutcome, NavError> {
        info!("Navigating {} legs from ({})", legs.len(), self.last_fix);

        sink.beep(3, 300)?;

        // Get moving so the first fixes give a heading
        sink.send(NavCommand::Forward)?;
        if !self.cancel.sleep_ms(self.params.control_tick_ms) {
            return self.cancelled(sink);
        }

        for (i, leg) in legs.iter().enumerate() {
            info!("Leg {}/{}: heading for ({})", i + 1, legs.len(), leg);

            match self.drive_leg(leg, sink)? {
                LegOutcome::Reached if i + 1 < legs.len() => {
                    info!("Reached turn point {}", i + 1);
                    sink.beep(2, 100)?;
                }
                LegOutcome::Reached => {}
                LegOutcome::Cancelled => return self.cancelled(sink),
            }
        }

        sink.send(NavCommand::Stop)?;
        sink.beep(5, 300)?;

        info!("Arrived at the destination");

        Ok(NavOutcome::Arrived)
    }

    fn cancelled(&self, sink: &dyn CommandSink) -> Result<NavOutcome, NavError> {
        info!("Navigation cancelled");
        sink.send(NavCommand::Stop)?;
        Ok(NavOutcome::Cancelled)
    }

    /// Drive until the car is within the arrival radius of `dest`.
    fn drive_leg(
        &mut self,
        dest: &GeoPoint,
        sink: &dyn CommandSink,
    ) -> Result<LegOutcome, NavError> {
        while !self.cancel.is_cancelled() {
            let fix = match self.gps.read_fix() {
                Ok(f) => f,
                Err(e) => {
                    warn!("GPS not ready: {}", e);
                    if !self.hold(sink)? {
                        break;
                    }
                    continue;
                }
            };

            if !self.bbox.contains(&fix) {
                warn!("Fix ({}) is outside the bounding box", fix);
                if !self.hold(sink)? {
                    break;
                }
                continue;
            }

            // Reject fixes which jump too far from the last one, unless there have been too many
            // in a row, in which case the car has probably really moved
            let jump_m = geo::distance_m(&fix, &self.last_fix);
            if jump_m > self.params.max_fix_jump_m
                && self.bad_fix_retries < self.params.max_bad_fix_retries
            {
                self.bad_fix_retries += 1;
                warn!(
                    "Fix jumped {:.2} m, waiting for a better signal ({}/{})",
                    jump_m, self.bad_fix_retries, self.params.max_bad_fix_retries
                );
                if !self.hold(sink)? {
                    break;
                }
                continue;
            }
            self.bad_fix_retries = 0;

            if let Some(track_log) = &self.track_log {
                track_log.log_fix(&fix);
            }

            let dist_m = geo::distance_m(&fix, dest);
            debug!("Fix ({}), {:.2} m to go", fix, dist_m);

            if dist_m < self.params.arrive_radius_m {
                sink.send(NavCommand::Stop)?;
                self.last_fix = fix;
                return Ok(LegOutcome::Reached);
            }

            sink.send(self.steer(&fix, dest))?;

            if !self.cancel.sleep_ms(self.params.control_tick_ms) {
                break;
            }

            self.last_fix = fix;
        }

        Ok(LegOutcome::Cancelled)
    }

    /// Choose the command which points the car at `dest`, given it moved from the last fix to
    /// `fix`.
    fn steer(&self, fix: &GeoPoint, dest: &GeoPoint) -> NavCommand {
        let mut side = geo::side(&self.last_fix, fix, dest);
        let angle = 180.0 - geo::angle_deg(&self.last_fix, fix, dest);

        if angle < self.params.aligned_angle_deg {
            side = Side::Middle;
        }

        debug!("Heading error {:.1} deg, destination on the {:?}", angle, side);

        match side {
            Side::Left => NavCommand::Turn(-angle),
            Side::Right => NavCommand::Turn(angle),
            Side::Middle => NavCommand::Forward,
        }
    }

    /// Stop the car and wait before reading the GPS again. Returns false if cancelled.
    fn hold(&self, sink: &dyn CommandSink) -> Result<bool, NavError> {
        sink.send(NavCommand::Stop)?;
        Ok(self.cancel.sleep_ms(self.params.gps_retry_ms))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{fast_waypoint_params, ScriptedGps, SinkEvent, SpySink};
    use comms_if::eqpt::GpsError;

    /// Metres per degree of latitude on the haversine sphere.
    const M_PER_DEG: f64 = 111_319.490_793;

    fn bbox() -> BoundingBox {
        BoundingBox::new(-0.001, 0.001, 0.001, -0.001).unwrap()
    }

    /// A point `north_m` north and `east_m` east of (0, 0)
    fn at(north_m: f64, east_m: f64) -> GeoPoint {
        GeoPoint::new(north_m / M_PER_DEG, east_m / M_PER_DEG)
    }

    fn cmds(events: &[SinkEvent]) -> Vec<NavCommand> {
        events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Cmd(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_straight_approach() -> Result<(), NavError> {
        let gps = ScriptedGps::new(vec![
            Ok(at(3.0, 0.0)),
            Ok(at(6.0, 0.0)),
            Ok(at(9.0, 0.0)),
            Ok(at(12.0, 0.0)),
            Ok(at(15.0, 0.0)),
            Ok(at(17.0, 0.0)),
        ]);
        let mut nav = WaypointNavigator::new(
            fast_waypoint_params(),
            bbox(),
            Box::new(gps),
            at(0.0, 0.0),
            CancelToken::new(),
        );
        let sink = SpySink::new();

        assert_eq!(nav.run(&[at(20.0, 0.0)], &sink)?, NavOutcome::Arrived);

        let events = sink.events();
        let cmds = cmds(&events);

        assert!(!cmds.iter().any(|c| c.is_turn()));
        assert_eq!(
            cmds,
            vec![
                NavCommand::Forward,
                NavCommand::Forward,
                NavCommand::Forward,
                NavCommand::Forward,
                NavCommand::Forward,
                NavCommand::Forward,
                NavCommand::Stop,
                NavCommand::Stop,
            ]
        );
        assert_eq!(events[0], SinkEvent::Beep(3, 300));
        assert_eq!(*events.last().unwrap(), SinkEvent::Beep(5, 300));

        Ok(())
    }

    #[test]
    fn test_turns_towards_leg_and_rejects_jumps() -> Result<(), NavError> {
        // Moving north with the leg off to the east, then the GPS reports the car at the leg, which
        // is a big jump and is only accepted after the maximum number of retries
        let gps = ScriptedGps::new(vec![Ok(at(3.0, 0.0)), Ok(at(3.0, 20.0))]);
        let mut nav = WaypointNavigator::new(
            fast_waypoint_params(),
            bbox(),
            Box::new(gps),
            at(0.0, 0.0),
            CancelToken::new(),
        );
        let sink = SpySink::new();

        assert_eq!(nav.run(&[at(3.0, 20.0)], &sink)?, NavOutcome::Arrived);

        let cmds = cmds(&sink.events());

        // Kick off, turn right by ~90 degrees, 5 rejected fixes, arrive, final stop
        assert_eq!(cmds.len(), 9);
        assert_eq!(cmds[0], NavCommand::Forward);
        match cmds[1] {
            NavCommand::Turn(a) => assert!((a - 90.0).abs() < 0.5, "turn was {}", a),
            c => panic!("Expected a turn, got {}", c),
        }
        assert!(cmds[2..].iter().all(|c| *c == NavCommand::Stop));

        Ok(())
    }

    #[test]
    fn test_multiple_legs_and_bad_fixes() -> Result<(), NavError> {
        let gps = ScriptedGps::new(vec![
            Err(GpsError::NoFix),
            Ok(GeoPoint::new(1.0, 1.0)),
            Ok(at(2.0, 0.0)),
            Ok(at(4.0, 2.0)),
            Ok(at(6.0, 4.0)),
            Ok(at(8.0, 6.0)),
        ]);
        let mut nav = WaypointNavigator::new(
            fast_waypoint_params(),
            bbox(),
            Box::new(gps),
            at(0.0, 0.0),
            CancelToken::new(),
        );
        let sink = SpySink::new();

        assert_eq!(
            nav.run(&[at(3.0, 0.0), at(8.0, 8.0)], &sink)?,
            NavOutcome::Arrived
        );

        let events = sink.events();
        let cmds = cmds(&events);

        // The failed read and the fix outside the box both stop the car, then the first leg is
        // reached straight away
        assert_eq!(
            cmds[..4],
            [
                NavCommand::Forward,
                NavCommand::Stop,
                NavCommand::Stop,
                NavCommand::Stop
            ]
        );
        assert!(events.contains(&SinkEvent::Beep(2, 100)));
        assert_eq!(*events.last().unwrap(), SinkEvent::Beep(5, 300));

        Ok(())
    }

    #[test]
    fn test_cancelled() -> Result<(), NavError> {
        let gps = ScriptedGps::new(vec![Ok(at(1.0, 0.0))]);
        let cancel = CancelToken::new();
        let mut nav = WaypointNavigator::new(
            fast_waypoint_params(),
            bbox(),
            Box::new(gps),
            at(0.0, 0.0),
            cancel.clone(),
        );
        let sink = SpySink::new();

        cancel.cancel();

        assert_eq!(nav.run(&[at(20.0, 0.0)], &sink)?, NavOutcome::Cancelled);
        assert_eq!(cmds(&sink.events()).last(), Some(&NavCommand::Stop));

        Ok(())
    }
}
