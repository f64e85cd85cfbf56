//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (RPI_CAR_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file {0:?}: {1}")]
    DeserialiseError(PathBuf, toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "params" directory in the software root.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    load_file(resolve(param_file_path)?)
}

/// Load a parameter file from anywhere on the filesystem.
pub fn load_file<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>
{
    let path = path.as_ref();

    // Load the file into a string
    let params_str = read_to_string(path)
        .map_err(|e| LoadError::FileLoadError(path.to_path_buf(), e))?;

    // Parse the string into the parameter struct
    toml::from_str(params_str.as_str())
        .map_err(|e| LoadError::DeserialiseError(path.to_path_buf(), e))
}

/// Get the full path of a file relative to the "params" directory, for data files (such as maps)
/// which sit next to the parameters but aren't TOML.
pub fn resolve(param_file_path: &str) -> Result<PathBuf, LoadError> {
    let mut path = crate::host::get_sw_root()
        .map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    Ok(path)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestParams {
        settle_ms: u64,
        angles_deg: Vec<f64>,
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join("util_params_test_load_file.toml");
        std::fs::write(&path, "settle_ms = 200\nangles_deg = [-15.0, 0.0, 15.0]\n").unwrap();

        let params: TestParams = load_file(&path).unwrap();
        assert_eq!(params.settle_ms, 200);
        assert_eq!(params.angles_deg, vec![-15.0, 0.0, 15.0]);

        std::fs::write(&path, "settle_ms = \"slow\"\n").unwrap();
        assert!(matches!(
            load_file::<TestParams, _>(&path),
            Err(LoadError::DeserialiseError(_, _))
        ));

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            load_file::<TestParams, _>(&path),
            Err(LoadError::FileLoadError(_, _))
        ));
    }
}
