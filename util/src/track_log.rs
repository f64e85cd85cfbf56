//! GPS track logger
//!
//! Writes every accepted GPS fix of a navigation to a CSV file (`timestamp,lat,lon`) from a
//! background thread, so that the navigator's control tick never waits on the filesystem.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use comms_if::eqpt::GeoPoint;
use log::{debug, warn};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Logs GPS fixes into a CSV file.
///
/// The file is flushed and closed when the logger is dropped.
pub struct TrackLogger {
    path: PathBuf,
    tx: Option<Sender<TrackRecord>>,
    jh: Option<JoinHandle<()>>,
}

/// A single row of the track log.
#[derive(Debug, Clone, Serialize)]
struct TrackRecord {
    timestamp: String,
    lat: f64,
    lon: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrackLogError {
    #[error("Cannot create the track log directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("Cannot create the track log file: {0}")]
    CannotCreateFile(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrackLogger {
    /// Create a new track log at the given path, creating parent directories if needed.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, TrackLogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(TrackLogError::CannotCreateDir)?;
        }

        let file = File::create(&path).map_err(TrackLogError::CannotCreateFile)?;

        let (tx, rx) = channel();
        let thread_path = path.clone();
        let jh = thread::spawn(move || write_thread(file, thread_path, rx));

        debug!("Track log opened at {:?}", path);

        Ok(Self {
            path,
            tx: Some(tx),
            jh: Some(jh),
        })
    }

    /// Path of the CSV file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a fix to be written, stamped with the current time.
    pub fn log_fix(&self, fix: &GeoPoint) {
        self.log_fix_at(fix, Utc::now())
    }

    fn log_fix_at(&self, fix: &GeoPoint, time: DateTime<Utc>) {
        let record = TrackRecord {
            timestamp: time.to_rfc3339(),
            lat: fix.lat,
            lon: fix.lon,
        };

        if let Some(tx) = &self.tx {
            if tx.send(record).is_err() {
                warn!("Track log writer for {:?} has exited, fix dropped", self.path);
            }
        }
    }
}

impl Drop for TrackLogger {
    fn drop(&mut self) {
        // Closing the channel ends the writer thread
        self.tx.take();

        if let Some(jh) = self.jh.take() {
            if jh.join().is_err() {
                warn!("Track log writer for {:?} panicked", self.path);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn write_thread(file: File, path: PathBuf, rx: Receiver<TrackRecord>) {
    let mut writer = csv::Writer::from_writer(file);

    while let Ok(record) = rx.recv() {
        if let Err(e) = writer.serialize(&record) {
            warn!("Couldn't write fix to track log {:?}: {}", path, e);
        }
    }

    if let Err(e) = writer.flush() {
        warn!("Couldn't flush track log {:?}: {}", path, e);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_track_log_format() {
        let path = std::env::temp_dir()
            .join("util_track_log_test")
            .join("track.csv");

        {
            let logger = TrackLogger::new(&path).unwrap();
            let time = Utc.ymd(2021, 3, 4).and_hms(5, 6, 7);
            logger.log_fix_at(&GeoPoint::new(22.5, 114.25), time);
            logger.log_fix_at(&GeoPoint::new(22.75, 114.5), time);
        }

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,lat,lon");
        assert_eq!(lines[1], "2021-03-04T05:06:07+00:00,22.5,114.25");
        assert_eq!(lines[2], "2021-03-04T05:06:07+00:00,22.75,114.5");

        fs::remove_file(&path).ok();
    }
}
