//! # Car Controller
//!
//! [`CarCtrl`] owns the car's devices and runs at most one session at a time:
//! - a navigation session, where a [`WaypointNavigator`] thread drives the car along a planned
//!   route through a [`DriveStateMachine`] without a scanner,
//! - a free roam session, where the [`DriveStateMachine`] owns the [`ObstacleScanner`] and avoids
//!   obstacles on its own.
//!
//! Devices are moved into the session's threads when it starts and are handed back when it ends,
//! so a new session can only start once the last one has been reaped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    path::PathBuf,
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Utc;
use comms_if::{
    eqpt::{DistanceMeter, GeoPoint, GpsSource, PanServo, VehicleActuator},
    tc::NavCommand,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use util::{
    cancel::CancelToken,
    params::{load as load_params, LoadError},
    session::TIMESTAMP_FORMAT,
    track_log::TrackLogger,
};

use crate::{
    drive::{CommandSink, DriveHandle, DriveParams, DriveParts, DriveStateMachine},
    map::GridMap,
    nav::{
        NavError, NavOutcome, PathPlanner, PathPlannerParams, PlannedRoute, WaypointNavigator,
        WaypointParams,
    },
    scan::{ObstacleScanner, ScanParams},
};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

type Actuator = Box<dyn VehicleActuator>;

type NavThreadOutput = (Box<dyn GpsSource>, Result<NavOutcome, NavError>);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The full set of devices fitted to the car.
pub struct CarDevices {
    pub gps: Box<dyn GpsSource>,
    pub actuator: Box<dyn VehicleActuator>,
    pub servo: Box<dyn PanServo>,
    pub meter: Box<dyn DistanceMeter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrlParams {
    /// Number of GPS reads made to find the origin of a navigation session
    pub origin_fix_attempts: u32,

    /// Time between origin fix attempts
    pub origin_fix_retry_ms: u64,

    /// If true accepted fixes are written to a CSV track log during navigation
    pub track_log: bool,
}

/// Parameters for the controller and everything it runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarCtrlParams {
    pub ctrl: CtrlParams,
    pub drive: DriveParams,
    pub scan: ScanParams,
    pub waypoint: WaypointParams,
    pub path_planner: PathPlannerParams,
}

pub struct CarCtrl {
    params: CarCtrlParams,
    map: GridMap,
    planner: PathPlanner,

    /// Directory track logs are written into, no logs are written if not set
    track_dir: Option<PathBuf>,

    /// Devices not currently owned by a session. `None` while a session runs, or if they were
    /// lost to a panicked thread.
    devices: Option<CarDevices>,

    session: Option<ActiveSession>,

    last_nav_outcome: Option<NavOutcome>,
}

struct NavSession {
    cancel: CancelToken,
    drive: DriveHandle,
    drive_jh: JoinHandle<DriveParts<Actuator>>,
    nav_jh: JoinHandle<NavThreadOutput>,

    // Unused while navigating, held for the next session
    servo: Box<dyn PanServo>,
    meter: Box<dyn DistanceMeter>,
}

struct RoamSession {
    drive: DriveHandle,
    drive_jh: JoinHandle<DriveParts<Actuator>>,

    // Unused while roaming, held for the next session
    gps: Box<dyn GpsSource>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

enum ActiveSession {
    Navigation(NavSession),
    FreeRoam(RoamSession),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CtrlParams {
    fn default() -> Self {
        Self {
            origin_fix_attempts: 10,
            origin_fix_retry_ms: 1000,
            track_log: true,
        }
    }
}

impl CarCtrlParams {
    /// Load every parameter file used by the controller.
    pub fn load() -> Result<Self, LoadError> {
        Ok(Self {
            ctrl: load_params("ctrl.toml")?,
            drive: load_params("drive.toml")?,
            scan: load_params("scan.toml")?,
            waypoint: load_params("waypoint.toml")?,
            path_planner: load_params("path_planner.toml")?,
        })
    }
}

impl CarCtrl {
    pub fn new(params: CarCtrlParams, map: GridMap, devices: CarDevices) -> Self {
        Self {
            planner: PathPlanner::new(params.path_planner.clone()),
            params,
            map,
            track_dir: None,
            devices: Some(devices),
            session: None,
            last_nav_outcome: None,
        }
    }

    /// Write a track log for each navigation session into the given directory.
    pub fn set_track_dir<P: Into<PathBuf>>(&mut self, dir: P) {
        self.track_dir = Some(dir.into());
    }

    pub fn map(&self) -> &GridMap {
        &self.map
    }

    /// Outcome of the most recently finished navigation session, if it didn't fail.
    pub fn last_nav_outcome(&self) -> Option<NavOutcome> {
        self.last_nav_outcome
    }

    /// Start navigating to the destination.
    ///
    /// The origin is taken from the GPS and a route to the destination is planned before anything
    /// moves. If this fails the car is left stopped and the controller is unchanged.
    pub fn start_navigation(&mut self, destination: GeoPoint) -> Result<(), NavError> {
        self.reap();

        if self.session.is_some() {
            return Err(NavError::AlreadyRunning);
        }

        if !self.map.bbox().contains(&destination) {
            warn!(
                "Destination ({}) is outside the bounding box {:?}",
                destination,
                self.map.bbox()
            );
            return Err(NavError::DestinationOutsideBbox);
        }

        let mut devices = self.devices.take().ok_or(NavError::DevicesUnavailable)?;

        let (origin, route) = match self.prepare_route(&mut *devices.gps, &destination) {
            Ok(r) => r,
            Err(e) => {
                self.devices = Some(devices);
                return Err(e);
            }
        };

        let CarDevices {
            gps,
            actuator,
            servo,
            meter,
        } = devices;

        let machine = DriveStateMachine::new(self.params.drive.clone(), actuator, None);
        let drive = machine.handle();
        let drive_jh = thread::spawn(move || machine.run());

        let cancel = CancelToken::new();
        let mut navigator = WaypointNavigator::new(
            self.params.waypoint.clone(),
            *self.map.bbox(),
            gps,
            origin,
            cancel.clone(),
        );
        if let Some(track_log) = self.open_track_log() {
            navigator = navigator.with_track_log(track_log);
        }

        let legs = route.legs;
        let nav_drive = drive.clone();
        let nav_jh = thread::spawn(move || {
            let result = navigator.run(&legs, &nav_drive);
            (navigator.into_gps(), result)
        });

        self.session = Some(ActiveSession::Navigation(NavSession {
            cancel,
            drive,
            drive_jh,
            nav_jh,
            servo,
            meter,
        }));
        self.last_nav_outcome = None;

        info!("Navigation to ({}) started", destination);

        Ok(())
    }

    /// Stop navigating, leaving the car stopped. Does nothing if the car isn't navigating.
    pub fn stop_navigation(&mut self) {
        match self.session {
            Some(ActiveSession::Navigation(_)) => {
                info!("Stopping navigation");
                self.end_session();
            }
            Some(ActiveSession::FreeRoam(_)) => debug!("Stop navigation requested while roaming"),
            None => debug!("Stop navigation requested with no session running"),
        }
    }

    /// Returns true while a navigation session is running.
    pub fn navigation_status(&mut self) -> bool {
        self.reap();
        matches!(self.session, Some(ActiveSession::Navigation(_)))
    }

    /// Start roaming freely, avoiding obstacles with the scanner.
    pub fn start_free_roam(&mut self) -> Result<(), NavError> {
        self.reap();

        if self.session.is_some() {
            return Err(NavError::AlreadyRunning);
        }

        let CarDevices {
            gps,
            actuator,
            servo,
            meter,
        } = self.devices.take().ok_or(NavError::DevicesUnavailable)?;

        let scanner = ObstacleScanner::new(self.params.scan.clone(), servo, meter);
        let machine = DriveStateMachine::new(self.params.drive.clone(), actuator, Some(scanner));
        let drive = machine.handle();
        let drive_jh = thread::spawn(move || machine.run());

        let session = RoamSession {
            drive,
            drive_jh,
            gps,
        };

        let kick_off = session
            .drive
            .beep(3, 300)
            .and_then(|_| session.drive.send(NavCommand::Forward));

        if let Err(e) = kick_off {
            self.devices = session.end();
            return Err(e.into());
        }

        self.session = Some(ActiveSession::FreeRoam(session));

        info!("Free roam started");

        Ok(())
    }

    /// Stop roaming, leaving the car stopped. Does nothing if the car isn't roaming.
    pub fn stop_free_roam(&mut self) {
        match self.session {
            Some(ActiveSession::FreeRoam(_)) => {
                info!("Stopping free roam");
                self.end_session();
            }
            Some(ActiveSession::Navigation(_)) => debug!("Stop free roam requested while navigating"),
            None => debug!("Stop free roam requested with no session running"),
        }
    }

    /// Returns true while a free roam session is running.
    pub fn free_roam_status(&mut self) -> bool {
        self.reap();
        matches!(self.session, Some(ActiveSession::FreeRoam(_)))
    }

    /// Get a fix inside the bounding box and plan a route from it.
    fn prepare_route(
        &self,
        gps: &mut dyn GpsSource,
        destination: &GeoPoint,
    ) -> Result<(GeoPoint, PlannedRoute), NavError> {
        let origin = self.acquire_origin(gps)?;
        let route = self.planner.plan(&self.map, &origin, destination)?;

        if self.params.path_planner.draw_path {
            info!("Planned path:\n{}", self.map.render(route.path.cells()));
        }

        Ok((origin, route))
    }

    fn acquire_origin(&self, gps: &mut dyn GpsSource) -> Result<GeoPoint, NavError> {
        let attempts = self.params.ctrl.origin_fix_attempts.max(1);

        for attempt in 1..=attempts {
            match gps.read_fix() {
                Ok(fix) if self.map.bbox().contains(&fix) => {
                    debug!("Origin fix ({}) on attempt {}", fix, attempt);
                    return Ok(fix);
                }
                Ok(fix) => warn!("Origin fix ({}) is outside the bounding box", fix),
                Err(e) => warn!("Couldn't read origin fix: {}", e),
            }

            if attempt < attempts {
                thread::sleep(Duration::from_millis(self.params.ctrl.origin_fix_retry_ms));
            }
        }

        Err(NavError::NoOriginFix)
    }

    fn open_track_log(&self) -> Option<TrackLogger> {
        if !self.params.ctrl.track_log {
            return None;
        }

        let path = self.track_dir.as_ref()?.join(format!(
            "track_{}.csv",
            Utc::now().format(TIMESTAMP_FORMAT)
        ));

        match TrackLogger::new(&path) {
            Ok(t) => {
                info!("Logging track to {:?}", t.path());
                Some(t)
            }
            Err(e) => {
                warn!("Navigating without a track log: {}", e);
                None
            }
        }
    }

    /// End the session if its threads have finished on their own.
    fn reap(&mut self) {
        let finished = match &self.session {
            Some(ActiveSession::Navigation(s)) => s.nav_jh.is_finished(),
            Some(ActiveSession::FreeRoam(s)) => s.drive_jh.is_finished(),
            None => false,
        };

        if finished {
            self.end_session();
        }
    }

    fn end_session(&mut self) {
        match self.session.take() {
            Some(ActiveSession::Navigation(s)) => {
                let (devices, outcome) = s.end();
                self.devices = devices;
                self.last_nav_outcome = outcome;
            }
            Some(ActiveSession::FreeRoam(s)) => self.devices = s.end(),
            None => return,
        }

        if self.devices.is_none() {
            error!("Devices were lost when the session ended, no more sessions can be started");
        }
    }
}

impl Drop for CarCtrl {
    fn drop(&mut self) {
        self.end_session();
    }
}

impl NavSession {
    fn end(self) -> (Option<CarDevices>, Option<NavOutcome>) {
        self.cancel.cancel();
        let nav = self.nav_jh.join();

        self.drive.shutdown();
        let drive = self.drive_jh.join();

        let (gps, outcome) = match nav {
            Ok((gps, Ok(outcome))) => {
                info!("Navigation ended: {:?}", outcome);
                (Some(gps), Some(outcome))
            }
            Ok((gps, Err(e))) => {
                warn!("Navigation failed: {}", e);
                (Some(gps), None)
            }
            Err(_) => {
                error!("The navigation thread panicked");
                (None, None)
            }
        };

        let actuator = match drive {
            Ok(parts) => Some(parts.actuator),
            Err(_) => {
                error!("The drive thread panicked");
                None
            }
        };

        let devices = match (gps, actuator) {
            (Some(gps), Some(actuator)) => Some(CarDevices {
                gps,
                actuator,
                servo: self.servo,
                meter: self.meter,
            }),
            _ => None,
        };

        (devices, outcome)
    }
}

impl RoamSession {
    fn end(self) -> Option<CarDevices> {
        self.drive.shutdown();

        match self.drive_jh.join() {
            Ok(DriveParts {
                actuator,
                scanner: Some(scanner),
            }) => {
                let (servo, meter) = scanner.into_devices();
                info!("Free roam ended");
                Some(CarDevices {
                    gps: self.gps,
                    actuator,
                    servo,
                    meter,
                })
            }
            Ok(_) => {
                error!("The drive state machine didn't hand back its scanner");
                None
            }
            Err(_) => {
                error!("The drive thread panicked");
                None
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
