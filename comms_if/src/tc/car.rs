//! # Car Commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command selecting the car's autonomous behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt)]
pub enum CarCmd {
    /// Plan a path across the map to the given coordinates and follow it using GPS.
    #[structopt(name = "nav")]
    Nav {
        /// Latitude of the destination in degrees.
        #[structopt(allow_hyphen_values = true)]
        lat: f64,

        /// Longitude of the destination in degrees.
        #[structopt(allow_hyphen_values = true)]
        lon: f64,

        /// Abort the navigation if the destination hasn't been reached after this many seconds.
        #[structopt(long, default_value = "600")]
        timeout_s: f64,
    },

    /// Drive freely, avoiding obstacles with the distance meter, for the given duration.
    #[structopt(name = "roam")]
    Roam {
        /// How long to roam for, in seconds.
        duration_s: f64,
    },
}
