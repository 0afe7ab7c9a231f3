use config::ConfigError;
use std::io::Error as IoError;
use thiserror::Error;

pub type SimResult<T, E = SimError> = Result<T, E>;

/// Top-level error type shared by the simulator crates.
///
/// Transport and codec layers keep their own protocol error types;
/// everything that crosses a crate boundary converges here.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("{0}")]
    Io(#[from] IoError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("transport address {0} not configured")]
    UnknownTransport(String),
    #[error("transport {0} failed to start: {1}")]
    TransportStart(String, String),
    #[error("{0}")]
    Msg(String),
}

impl From<String> for SimError {
    #[inline]
    fn from(e: String) -> Self {
        SimError::Msg(e)
    }
}

impl From<&str> for SimError {
    #[inline]
    fn from(e: &str) -> Self {
        SimError::Msg(e.to_string())
    }
}
