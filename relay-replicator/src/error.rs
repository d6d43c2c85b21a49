use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use relay::error::RelayError;

/// Result type for replicator operations.
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Backtrace captured when a non-relay error enters the replicator.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the replicator service.
#[derive(Debug)]
pub enum ReplicatorError {
    /// Pipeline error.
    Relay(RelayError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl ReplicatorError {
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Relay(_) => "pipeline error",
            ReplicatorError::Config(_, _) => "configuration error",
            ReplicatorError::Io(_, _) => "i/o error",
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Relay(err) => write!(f, "{}: {err}", self.category()),
            ReplicatorError::Config(err, _) => write!(f, "{}: {err}", self.category()),
            ReplicatorError::Io(err, _) => write!(f, "{}: {err}", self.category()),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Relay(err) => Some(err),
            ReplicatorError::Config(err, _) => Some(err.as_ref()),
            ReplicatorError::Io(err, _) => Some(err),
        }
    }
}

impl From<RelayError> for ReplicatorError {
    fn from(err: RelayError) -> Self {
        ReplicatorError::Relay(err)
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err, CapturedBacktrace::capture())
    }
}
