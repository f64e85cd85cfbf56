//! Main car executable entry point.
//!
//! # Architecture
//!
//! The executable runs a single command given on the command line:
//!
//!     - Initialise the session and logging
//!     - Load parameters and the map
//!     - Build the simulated car and the controller around it
//!     - Run the command:
//!         - `nav <lat> <lon>`: navigate to the destination, giving up after the timeout
//!         - `roam <duration_s>`: roam freely, avoiding obstacles, for the given time
//!     - Stop the car and close the session

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::{
    thread,
    time::{Duration, Instant},
};
use structopt::StructOpt;

// Internal
use car_lib::{
    ctrl::{CarCtrl, CarCtrlParams},
    map::GridMap,
    params::CarExecParams,
    sim::SimWorld,
};
use comms_if::{eqpt::GeoPoint, tc::CarCmd};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period at which the session status is polled.
const STATUS_POLL_PERIOD: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "car_exec", about = "Raspberry Pi car navigation executable")]
struct Opt {
    #[structopt(subcommand)]
    cmd: CarCmd,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("car_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("RPi Car Executable\n");
    let host_info = host::get_uname().wrap_err("Failed to get host information")?;
    info!(
        "Running on: {} ({} {} {})",
        host_info.nodename, host_info.sysname, host_info.release, host_info.machine
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: CarExecParams =
        util::params::load("car_exec.toml").wrap_err("Could not load car_exec params")?;
    let ctrl_params = CarCtrlParams::load().wrap_err("Could not load controller params")?;

    info!("Exec parameters loaded");

    // ---- LOAD MAP ----

    let map_path = util::params::resolve(&exec_params.map_file)
        .wrap_err("Could not find the map file")?;
    let map = GridMap::load(&map_path, exec_params.bbox, exec_params.cell_size_deg)
        .wrap_err_with(|| format!("Could not load the map from {:?}", map_path))?;

    info!(
        "Loaded {} by {} cell map from {:?}",
        map.num_rows(),
        map.num_cols(),
        map_path
    );

    // ---- INITIALISE CAR ----

    let world = SimWorld::new(exec_params.sim.clone(), map.clone()).into_shared();

    let mut ctrl = CarCtrl::new(ctrl_params, map, SimWorld::devices(&world));
    ctrl.set_track_dir(session.session_root.join("tracks"));

    info!("Car initialised, starting at ({})\n", exec_params.sim.start);

    // ---- RUN COMMAND ----

    let result = match opt.cmd {
        CarCmd::Nav {
            lat,
            lon,
            timeout_s,
        } => navigate(&mut ctrl, GeoPoint::new(lat, lon), timeout_s),
        CarCmd::Roam { duration_s } => roam(&mut ctrl, duration_s),
    };

    // ---- SHUTDOWN ----

    // Dropping the controller stops any session still running
    drop(ctrl);

    info!("End of execution");

    session.exit();

    result
}

fn navigate(ctrl: &mut CarCtrl, destination: GeoPoint, timeout_s: f64) -> Result<(), Report> {
    ctrl.start_navigation(destination)
        .wrap_err("Failed to start navigation")?;

    let timeout = Duration::from_secs_f64(timeout_s.max(0.0));
    let start = Instant::now();

    while ctrl.navigation_status() {
        if start.elapsed() > timeout {
            warn!("Navigation timed out after {:.0} s", timeout_s);
            ctrl.stop_navigation();
            return Err(eyre!("Navigation to ({}) timed out", destination));
        }

        thread::sleep(STATUS_POLL_PERIOD);
    }

    match ctrl.last_nav_outcome() {
        Some(outcome) => {
            info!("Navigation complete: {:?}", outcome);
            Ok(())
        }
        None => Err(eyre!("Navigation to ({}) failed", destination)),
    }
}

fn roam(ctrl: &mut CarCtrl, duration_s: f64) -> Result<(), Report> {
    ctrl.start_free_roam().wrap_err("Failed to start free roam")?;

    let duration = Duration::from_secs_f64(duration_s.max(0.0));
    let start = Instant::now();

    while start.elapsed() < duration {
        if !ctrl.free_roam_status() {
            return Err(eyre!("Free roam ended unexpectedly"));
        }

        thread::sleep(STATUS_POLL_PERIOD);
    }

    ctrl.stop_free_roam();

    info!("Free roam complete after {:.0} s", duration_s);

    Ok(())
}
