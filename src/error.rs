use std::fmt::{self, Debug, Display};
use std::io;
use std::path::PathBuf;

/// Provides `EpiError` and maps other errors to it
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpiError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    EncodeError(bincode::error::EncodeError),
    DecodeError(bincode::error::DecodeError),
    /// A missing or invalid value in the configuration. Always fatal at startup.
    ConfigError(String),
    /// The per-run output directory must be fresh.
    OutputExists(PathBuf),
    SimulationError(String),
}

impl From<io::Error> for EpiError {
    fn from(error: io::Error) -> Self {
        EpiError::IoError(error)
    }
}

impl From<serde_json::Error> for EpiError {
    fn from(error: serde_json::Error) -> Self {
        EpiError::JsonError(error)
    }
}

impl From<csv::Error> for EpiError {
    fn from(error: csv::Error) -> Self {
        EpiError::CsvError(error)
    }
}

impl From<bincode::error::EncodeError> for EpiError {
    fn from(error: bincode::error::EncodeError) -> Self {
        EpiError::EncodeError(error)
    }
}

impl From<bincode::error::DecodeError> for EpiError {
    fn from(error: bincode::error::DecodeError) -> Self {
        EpiError::DecodeError(error)
    }
}

impl From<String> for EpiError {
    fn from(error: String) -> Self {
        EpiError::SimulationError(error)
    }
}

impl From<&str> for EpiError {
    fn from(error: &str) -> Self {
        EpiError::SimulationError(error.to_string())
    }
}

impl std::error::Error for EpiError {}

impl Display for EpiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpiError::ConfigError(message) => write!(f, "Config error: {message}"),
            EpiError::OutputExists(path) => {
                write!(f, "Output directory already exists: {}", path.display())
            }
            _ => write!(f, "Error: {self:?}"),
        }
    }
}

/// Shorthand for building a `ConfigError` from anything printable.
pub(crate) fn config_error(message: impl Into<String>) -> EpiError {
    EpiError::ConfigError(message.into())
}
