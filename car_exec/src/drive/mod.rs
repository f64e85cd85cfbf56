//! # Drive State Machine
//!
//! The [`DriveStateMachine`] is the only thing which commands the vehicle actuator. It consumes
//! [`NavCommand`]s from a bounded channel fed by any number of producers through
//! [`DriveHandle`]s, acting only on the most recent command whenever several are waiting.
//!
//! Each command may queue a follow-up command once it has been carried out, for instance backing
//! off is always followed by a stop. When the machine owns an [`ObstacleScanner`] (free roam) a
//! stop is followed by a wide scan, the scan by a turn towards the most open direction, and the
//! turn by forward motion guarded by an ahead scan watchdog running on its own thread.
//!
//! Horn requests are carried out on the drive loop before the batch's command, since the loop owns
//! the actuator. A long request such as `beep(5, 300)` therefore holds up command handling for its
//! whole duration, so producers only beep while the car is stopped or at the start of a session.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::{
    fmt::Display,
    sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError},
    thread::{self, JoinHandle},
};

use comms_if::{
    eqpt::{ActuatorError, VehicleActuator},
    tc::NavCommand,
};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use util::cancel::CancelToken;

use crate::scan::{AheadScanExit, ObstacleScanner};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Smallest allowed command channel capacity, enough to hold a command from every producer plus a
/// follow-up.
pub const MIN_CHANNEL_CAPACITY: usize = 4;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Something that accepts commands for the drive state machine.
pub trait CommandSink {
    /// Queue a command.
    fn send(&self, cmd: NavCommand) -> Result<(), SinkClosed>;

    /// Queue a horn request. Horn requests don't change the drive state and are never dropped in
    /// favour of newer commands.
    fn beep(&self, times: u32, interval_ms: u32) -> Result<(), SinkClosed>;
}

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveParams {
    /// Capacity of the command channel, at least [`MIN_CHANNEL_CAPACITY`]
    pub channel_capacity: usize,

    /// Time to wait after stopping before doing anything else
    pub stop_settle_ms: u64,

    /// How long to reverse for when backing off an obstacle
    pub backward_ms: u64,

    /// Time to wait after a turn before driving forwards
    pub turn_settle_ms: u64,

    /// Time to wait after starting or continuing forward motion
    pub forward_settle_ms: u64,

    /// Number of times in a row a wide scan may send the car backwards before it turns anyway
    pub max_scan_retries: u32,

    /// Obstacles closer than this in a wide scan make the car back off
    pub near_obstacle_cm: f64,

    /// Wide scan angle at the edge of the sweep. Close obstacles seen at the edges are beside the
    /// car rather than in front of it, so they don't cause a back off.
    pub edge_angle_deg: f64,

    /// Period at which the ahead scan watchdog retries sending into a full channel
    pub watchdog_send_retry_ms: u64,
}

/// Cloneable handle used to send commands to a running [`DriveStateMachine`].
#[derive(Clone)]
pub struct DriveHandle {
    tx: SyncSender<DriveMsg>,
    cancel: CancelToken,
}

/// The devices handed back by the state machine when it exits.
pub struct DriveParts<A> {
    pub actuator: A,
    pub scanner: Option<ObstacleScanner>,
}

pub struct DriveStateMachine<A> {
    params: DriveParams,
    actuator: A,
    scanner: ScannerSlot,
    state: DriveState,
    scan_retries: u32,

    rx: Receiver<DriveMsg>,

    /// Handle to our own channel for follow-up commands
    handle: DriveHandle,

    /// Cancelled on shutdown, wakes the machine from any delay
    cancel: CancelToken,
}

/// The ahead scan watchdog, scanning on its own thread while the car drives forwards.
struct Watchdog {
    cancel: CancelToken,
    jh: JoinHandle<ObstacleScanner>,
}

/// Sink used by the watchdog. Sending never blocks past the watchdog's cancellation, so that the
/// state machine can't deadlock joining a watchdog stuck on a full channel.
struct WatchdogSink {
    handle: DriveHandle,
    cancel: CancelToken,
    retry_ms: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("The drive command channel is closed")]
pub struct SinkClosed;

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveState {
    Forward,
    Backward,
    Stop,
    Scan,
    Turn,
}

/// Messages carried on the command channel.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DriveMsg {
    Cmd(NavCommand),
    Beep { times: u32, interval_ms: u32 },
    Shutdown,
}

/// Where the scanner currently is.
enum ScannerSlot {
    /// No scanner, the machine is driven by the navigator
    Absent,

    /// Owned by the machine and available for a wide scan
    Idle(ObstacleScanner),

    /// Lent to the ahead scan watchdog
    Watching(Watchdog),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            channel_capacity: MIN_CHANNEL_CAPACITY,
            stop_settle_ms: 20,
            backward_ms: 500,
            turn_settle_ms: 150,
            forward_settle_ms: 50,
            max_scan_retries: 4,
            near_obstacle_cm: 10.0,
            edge_angle_deg: 90.0,
            watchdog_send_retry_ms: 5,
        }
    }
}

impl Display for DriveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveState::Forward => write!(f, "Forward"),
            DriveState::Backward => write!(f, "Backward"),
            DriveState::Stop => write!(f, "Stop"),
            DriveState::Scan => write!(f, "Scan"),
            DriveState::Turn => write!(f, "Turn"),
        }
    }
}

impl<A: VehicleActuator + 'static> DriveStateMachine<A> {
    /// Create a new state machine.
    ///
    /// Passing a scanner puts the machine in free roam, where stops lead to scans and forward
    /// motion is guarded by the ahead scan. Without one the machine only carries out the commands
    /// it is sent.
    pub fn new(params: DriveParams, actuator: A, scanner: Option<ObstacleScanner>) -> Self {
        let capacity = if params.channel_capacity < MIN_CHANNEL_CAPACITY {
            warn!(
                "Drive channel capacity {} is too small, using {}",
                params.channel_capacity, MIN_CHANNEL_CAPACITY
            );
            MIN_CHANNEL_CAPACITY
        } else {
            params.channel_capacity
        };

        let (tx, rx) = sync_channel(capacity);
        let cancel = CancelToken::new();

        Self {
            params,
            actuator,
            scanner: match scanner {
                Some(s) => ScannerSlot::Idle(s),
                None => ScannerSlot::Absent,
            },
            state: DriveState::Stop,
            scan_retries: 0,
            rx,
            handle: DriveHandle {
                tx,
                cancel: cancel.clone(),
            },
            cancel,
        }
    }

    /// Get a handle to send commands to this machine.
    pub fn handle(&self) -> DriveHandle {
        self.handle.clone()
    }

    /// Run the command loop until [`DriveHandle::shutdown`] is called.
    ///
    /// On exit the watchdog is stopped, the car is stopped and the devices are handed back.
    pub fn run(mut self) -> DriveParts<A> {
        info!("Drive state machine started in {}", self.state);

        loop {
            // Block for the next message, then take everything else that's waiting
            let first = match self.rx.recv() {
                Ok(m) => m,
                Err(_) => break,
            };
            let mut batch = vec![first];
            while let Ok(m) = self.rx.try_recv() {
                batch.push(m);
            }

            let mut latest: Option<NavCommand> = None;
            let mut shutdown = false;

            for msg in batch {
                match msg {
                    DriveMsg::Cmd(cmd) => {
                        if let Some(stale) = latest.replace(cmd) {
                            debug!("Dropping stale command {}", stale);
                        }
                    }
                    // Blocks the loop for the length of the request
                    DriveMsg::Beep { times, interval_ms } => {
                        if let Err(e) = self.actuator.beep(times, interval_ms) {
                            warn!("Couldn't sound the horn: {}", e);
                        }
                    }
                    DriveMsg::Shutdown => shutdown = true,
                }
            }

            if shutdown || self.cancel.is_cancelled() {
                break;
            }

            if let Some(cmd) = latest {
                self.handle_cmd(cmd);
            }
        }

        self.stop_watchdog();
        self.actuate("stop", |a| a.stop());
        self.set_state(DriveState::Stop);

        info!("Drive state machine stopped");

        DriveParts {
            actuator: self.actuator,
            scanner: match self.scanner {
                ScannerSlot::Idle(s) => Some(s),
                _ => None,
            },
        }
    }

    fn handle_cmd(&mut self, cmd: NavCommand) {
        trace!("Handling {} in {}", cmd, self.state);

        // Only forward motion keeps the ahead scan running
        if cmd != NavCommand::Forward {
            self.stop_watchdog();
        }

        match cmd {
            NavCommand::Backward => {
                self.set_state(DriveState::Backward);
                self.actuate("stop", |a| a.stop());
                self.cancel.sleep_ms(self.params.stop_settle_ms);
                self.actuate("backward", |a| a.backward());
                self.cancel.sleep_ms(self.params.backward_ms);
                self.follow_up(NavCommand::Stop);
            }
            NavCommand::Stop => {
                self.set_state(DriveState::Stop);
                self.actuate("stop", |a| a.stop());
                self.cancel.sleep_ms(self.params.stop_settle_ms);
                if self.has_scanner() {
                    self.follow_up(NavCommand::Scan);
                }
            }
            NavCommand::Scan => {
                self.set_state(DriveState::Scan);
                self.scan();
            }
            NavCommand::Turn(angle) => {
                self.set_state(DriveState::Turn);
                self.actuate("turn", |a| a.turn(angle));
                self.cancel.sleep_ms(self.params.turn_settle_ms);
                self.follow_up(NavCommand::Forward);
            }
            NavCommand::Forward => {
                if self.state != DriveState::Forward {
                    self.set_state(DriveState::Forward);
                    self.actuate("forward", |a| a.forward());
                    self.start_watchdog();
                }
                self.cancel.sleep_ms(self.params.forward_settle_ms);
            }
        }
    }

    /// Wide scan and choose between backing off and turning towards the most open direction.
    fn scan(&mut self) {
        let cancel = self.cancel.clone();

        let result = match &mut self.scanner {
            ScannerSlot::Idle(scanner) => scanner.wide_scan(&cancel),
            _ => {
                warn!("Scan requested without an idle scanner, ignoring");
                return;
            }
        };

        let near_and_ahead = result.min_dist_cm < self.params.near_obstacle_cm
            && result.min_angle_deg.abs() != self.params.edge_angle_deg;

        if near_and_ahead && self.scan_retries < self.params.max_scan_retries {
            self.scan_retries += 1;
            info!(
                "Obstacle {:.0} cm away at {:.0} deg, backing off (attempt {})",
                result.min_dist_cm, result.min_angle_deg, self.scan_retries
            );
            self.follow_up(NavCommand::Backward);
        } else {
            self.scan_retries = 0;
            info!("Turning towards the most open direction at {:.0} deg", result.max_angle_deg);
            self.follow_up(NavCommand::Turn(result.max_angle_deg));
        }
    }

    fn has_scanner(&self) -> bool {
        !matches!(self.scanner, ScannerSlot::Absent)
    }

    /// Lend the scanner to a new watchdog thread, if the machine has one.
    fn start_watchdog(&mut self) {
        let scanner = match std::mem::replace(&mut self.scanner, ScannerSlot::Absent) {
            ScannerSlot::Idle(s) => s,
            other => {
                self.scanner = other;
                return;
            }
        };

        let cancel = CancelToken::new();
        let sink = WatchdogSink {
            handle: self.handle.clone(),
            cancel: cancel.clone(),
            retry_ms: self.params.watchdog_send_retry_ms,
        };
        let thread_cancel = cancel.clone();

        let jh = thread::spawn(move || {
            let mut scanner = scanner;
            match scanner.ahead_scan_loop(&thread_cancel, &sink) {
                AheadScanExit::Cancelled => debug!("Ahead scan cancelled"),
                AheadScanExit::Obstacle { command, .. } => {
                    debug!("Ahead scan ended with {}", command)
                }
            }
            scanner
        });

        debug!("Ahead scan watchdog started");

        self.scanner = ScannerSlot::Watching(Watchdog { cancel, jh });
    }

    /// Cancel the watchdog, if one is running, and take the scanner back.
    fn stop_watchdog(&mut self) {
        let watchdog = match std::mem::replace(&mut self.scanner, ScannerSlot::Absent) {
            ScannerSlot::Watching(w) => w,
            other => {
                self.scanner = other;
                return;
            }
        };

        watchdog.cancel.cancel();

        match watchdog.jh.join() {
            Ok(scanner) => {
                debug!("Ahead scan watchdog stopped");
                self.scanner = ScannerSlot::Idle(scanner);
            }
            Err(_) => {
                error!("Ahead scan watchdog panicked, the scanner has been lost");
            }
        }
    }

    /// Queue a follow-up command without blocking.
    ///
    /// If the channel is full newer commands are already waiting, so the follow-up is dropped.
    fn follow_up(&self, cmd: NavCommand) {
        match self.handle.tx.try_send(DriveMsg::Cmd(cmd)) {
            Ok(_) => trace!("Queued follow-up {}", cmd),
            Err(TrySendError::Full(_)) => {
                debug!("Channel full, dropping follow-up {}", cmd)
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Channel closed, dropping follow-up {}", cmd)
            }
        }
    }

    fn set_state(&mut self, state: DriveState) {
        if state != self.state {
            info!("Drive state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Run an actuator operation, logging any failure.
    fn actuate<F>(&mut self, what: &str, op: F)
    where
        F: FnOnce(&mut A) -> Result<(), ActuatorError>,
    {
        if let Err(e) = op(&mut self.actuator) {
            warn!("Actuator {} failed: {}", what, e);
        }
    }
}

impl DriveHandle {
    /// Stop the state machine.
    ///
    /// Wakes it from any delay it is in, then queues the shutdown request. The machine hands its
    /// devices back through the return value of [`DriveStateMachine::run`].
    pub fn shutdown(&self) {
        self.cancel.cancel();

        if self.tx.send(DriveMsg::Shutdown).is_err() {
            debug!("Drive state machine already stopped");
        }
    }

    /// Queue a message, retrying while the channel is full until it is accepted or the token is
    /// cancelled. Returns `Ok(false)` if the message was abandoned due to cancellation.
    fn send_or_cancel(
        &self,
        msg: DriveMsg,
        cancel: &CancelToken,
        retry_ms: u64,
    ) -> Result<bool, SinkClosed> {
        let mut msg = msg;

        loop {
            match self.tx.try_send(msg) {
                Ok(_) => return Ok(true),
                Err(TrySendError::Disconnected(_)) => return Err(SinkClosed),
                Err(TrySendError::Full(m)) => {
                    msg = m;
                    if !cancel.sleep_ms(retry_ms.max(1)) {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

impl CommandSink for DriveHandle {
    fn send(&self, cmd: NavCommand) -> Result<(), SinkClosed> {
        self.tx.send(DriveMsg::Cmd(cmd)).map_err(|_| SinkClosed)
    }

    fn beep(&self, times: u32, interval_ms: u32) -> Result<(), SinkClosed> {
        self.tx
            .send(DriveMsg::Beep { times, interval_ms })
            .map_err(|_| SinkClosed)
    }
}

impl CommandSink for WatchdogSink {
    fn send(&self, cmd: NavCommand) -> Result<(), SinkClosed> {
        if !self
            .handle
            .send_or_cancel(DriveMsg::Cmd(cmd), &self.cancel, self.retry_ms)?
        {
            debug!("Watchdog cancelled before {} could be sent", cmd);
        }
        Ok(())
    }

    fn beep(&self, times: u32, interval_ms: u32) -> Result<(), SinkClosed> {
        self.handle
            .send_or_cancel(
                DriveMsg::Beep { times, interval_ms },
                &self.cancel,
                self.retry_ms,
            )
            .map(|_| ())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{
        fast_drive_params, fast_scan_params, ActCall, AngleMeter, SpyActuator, SpyServo,
    };
    use std::time::Duration;

    fn settle() {
        thread::sleep(Duration::from_millis(100));
    }

    #[test]
    fn test_stale_commands_dropped() {
        let actuator = SpyActuator::new();
        let calls = actuator.calls();

        let machine = DriveStateMachine::new(fast_drive_params(), actuator, None);
        let handle = machine.handle();

        // Queue everything before the machine starts so it's all drained together
        handle.beep(2, 100).unwrap();
        handle.send(NavCommand::Forward).unwrap();
        handle.send(NavCommand::Forward).unwrap();
        handle.send(NavCommand::Stop).unwrap();

        let jh = thread::spawn(move || machine.run());
        settle();
        handle.shutdown();
        let parts = jh.join().unwrap();

        assert!(parts.scanner.is_none());

        let calls = calls.lock().unwrap();
        assert!(!calls.contains(&ActCall::Forward));
        assert_eq!(calls[0], ActCall::Beep(2, 100));
        assert_eq!(calls[1], ActCall::Stop);
        assert_eq!(*calls.last().unwrap(), ActCall::Stop);
    }

    #[test]
    fn test_every_beep_runs_before_the_command() {
        let actuator = SpyActuator::new();
        let calls = actuator.calls();

        let machine = DriveStateMachine::new(fast_drive_params(), actuator, None);
        let handle = machine.handle();

        handle.send(NavCommand::Forward).unwrap();
        handle.beep(1, 10).unwrap();
        handle.send(NavCommand::Stop).unwrap();
        handle.beep(5, 300).unwrap();

        let jh = thread::spawn(move || machine.run());
        settle();
        handle.shutdown();
        jh.join().unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[..3].to_vec(),
            vec![ActCall::Beep(1, 10), ActCall::Beep(5, 300), ActCall::Stop]
        );
        assert!(!calls.contains(&ActCall::Forward));
    }

    #[test]
    fn test_turn_follows_with_forward() {
        let actuator = SpyActuator::new();
        let calls = actuator.calls();

        let machine = DriveStateMachine::new(fast_drive_params(), actuator, None);
        let handle = machine.handle();
        let jh = thread::spawn(move || machine.run());

        handle.send(NavCommand::Turn(-30.0)).unwrap();
        settle();
        handle.send(NavCommand::Backward).unwrap();
        settle();
        handle.shutdown();
        jh.join().unwrap();

        // Without a scanner a stop doesn't lead to a scan
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ActCall::Turn(-30.0),
                ActCall::Forward,
                ActCall::Stop,
                ActCall::Backward,
                ActCall::Stop,
                ActCall::Stop,
            ]
        );
    }

    #[test]
    fn test_free_roam_turns_to_open_direction() {
        let actuator = SpyActuator::new();
        let calls = actuator.calls();

        // Wide open at 30 degrees, everything else far enough not to trigger the ahead scan
        let servo = SpyServo::new();
        let meter = AngleMeter::new(servo.angle(), |a| if a == 30.0 { 300.0 } else { 100.0 });
        let scanner = ObstacleScanner::new(fast_scan_params(), Box::new(servo), Box::new(meter));

        let machine = DriveStateMachine::new(fast_drive_params(), actuator, Some(scanner));
        let handle = machine.handle();
        let jh = thread::spawn(move || machine.run());

        handle.send(NavCommand::Stop).unwrap();
        settle();
        handle.shutdown();
        let parts = jh.join().unwrap();

        // The scanner comes back from the watchdog
        assert!(parts.scanner.is_some());

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[..3],
            [ActCall::Stop, ActCall::Turn(30.0), ActCall::Forward]
        );
        assert_eq!(*calls.last().unwrap(), ActCall::Stop);
    }

    #[test]
    fn test_free_roam_backs_off_then_turns() {
        let actuator = SpyActuator::new();
        let calls = actuator.calls();

        // Something very close dead ahead, the sides are clear
        let servo = SpyServo::new();
        let meter = AngleMeter::new(servo.angle(), |a| if a == 0.0 { 5.0 } else { 100.0 });
        let scanner = ObstacleScanner::new(fast_scan_params(), Box::new(servo), Box::new(meter));

        let machine = DriveStateMachine::new(fast_drive_params(), actuator, Some(scanner));
        let handle = machine.handle();
        let jh = thread::spawn(move || machine.run());

        handle.send(NavCommand::Scan).unwrap();
        thread::sleep(Duration::from_millis(300));
        handle.shutdown();
        jh.join().unwrap();

        let calls = calls.lock().unwrap();
        let first_turn = calls
            .iter()
            .position(|c| matches!(c, ActCall::Turn(_)))
            .unwrap();

        // Backs off the maximum number of times before giving up and turning
        let backs = calls[..first_turn]
            .iter()
            .filter(|c| **c == ActCall::Backward)
            .count();
        assert_eq!(backs, 4);
        assert_eq!(calls[first_turn], ActCall::Turn(-90.0));
    }
}
