use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Fetching zero entries per batch would never make progress.
    #[error("`batch_size` cannot be zero")]
    BatchSizeZero,
    /// Every normalized change is tagged with the destination, so it must be named.
    #[error("`destination` cannot be empty")]
    DestinationEmpty,
    /// The selected mode has no endpoint settings.
    #[error("mode `{mode}` requires the `{section}` section to be set")]
    MissingEndpoint {
        mode: &'static str,
        section: &'static str,
    },
    /// An endpoint setting holds an unusable value.
    #[error("invalid endpoint config: {0}")]
    InvalidEndpoint(String),
}
