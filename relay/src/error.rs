//! Error types and result definitions for relay operations.
//!
//! [`RelayError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source, and the callsite where it was raised. Failures of
//! several workers can be aggregated into a single error.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use relay_config::shared::ValidationError;

/// Result type used throughout the relay.
pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for relay operations.
#[derive(Debug, Clone)]
pub struct RelayError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Errors collected from several workers.
    Many {
        errors: Vec<RelayError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures raised by the relay.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Transport Errors
    ConnectionFailed,
    SubscriptionFailed,
    FetchFailed,
    AcknowledgeFailed,
    DisconnectFailed,

    // Data Errors
    DecodeError,
    ConversionError,
    InvalidData,

    // Consumer Errors
    HandlerFailed,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // State & Workflow Errors
    InvalidState,
    WorkerPanic,
    WorkerCancelled,

    Unknown,
}

impl ErrorKind {
    /// Returns `true` for failures of the connection to the change-capture server.
    ///
    /// These are recovered by reconnecting rather than by stopping the pipeline.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionFailed
                | ErrorKind::SubscriptionFailed
                | ErrorKind::FetchFailed
                | ErrorKind::AcknowledgeFailed
                | ErrorKind::DisconnectFailed
                | ErrorKind::IoError
        )
    }
}

impl RelayError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description, or `None` for aggregated errors.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the first available dynamic detail.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite that created this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error.
    ///
    /// Has no effect on aggregated errors, which expose their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        RelayError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &RelayError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {title}")?;
    if body.trim().is_empty() {
        return write!(f, " <empty>");
    }

    for line in body.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl error::Error for RelayError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RelayError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> RelayError {
        RelayError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for RelayError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> RelayError {
        RelayError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors, returning a single error unchanged.
impl<E> From<Vec<E>> for RelayError
where
    E: Into<RelayError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> RelayError {
        let location = Location::caller();
        let mut errors: Vec<RelayError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        RelayError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for RelayError {
    #[track_caller]
    fn from(err: std::io::Error) -> RelayError {
        let detail = err.to_string();
        RelayError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for RelayError {
    #[track_caller]
    fn from(err: serde_json::Error) -> RelayError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        let detail = err.to_string();
        RelayError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<ValidationError> for RelayError {
    #[track_caller]
    fn from(err: ValidationError) -> RelayError {
        let detail = err.to_string();
        RelayError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid pipeline options"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay_error;

    #[test]
    fn single_error_keeps_kind_and_detail() {
        let err = relay_error!(ErrorKind::FetchFailed, "Fetch failed", "socket closed");

        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(err.detail(), Some("socket closed"));
        assert!(err.kind().is_transient());
        assert!(err.to_string().contains("Fetch failed"));
    }

    #[test]
    fn aggregation_flattens_kinds() {
        let err: RelayError = vec![
            relay_error!(ErrorKind::HandlerFailed, "Handler failed"),
            relay_error!(ErrorKind::WorkerPanic, "Worker panicked"),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::HandlerFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::HandlerFailed, ErrorKind::WorkerPanic]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors"));
    }

    #[test]
    fn single_element_aggregation_is_unwrapped() {
        let err: RelayError = vec![relay_error!(ErrorKind::ConfigError, "Bad")].into();

        assert_eq!(err.description(), Some("Bad"));
    }

    #[test]
    fn validation_errors_are_config_errors() {
        let err: RelayError = ValidationError::BatchSizeZero.into();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(!err.kind().is_transient());
        assert!(error::Error::source(&err).is_some());
    }
}
