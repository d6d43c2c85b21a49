use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{
    ClusterEndpoint, ClusterEndpointWithoutSecrets, StandaloneEndpoint,
    StandaloneEndpointWithoutSecrets, ValidationError,
};

/// How the relay reaches the change-capture server.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// A single server addressed by host and port.
    #[default]
    Standalone,
    /// A server group with failover, discovered through a coordination service.
    Cluster,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Standalone => "standalone",
            PipelineMode::Cluster => "cluster",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_batch_size() -> usize {
    1000
}

fn default_destination() -> String {
    "example".to_owned()
}

fn default_filter() -> String {
    ".*\\..*".to_owned()
}

const fn default_is_async() -> bool {
    true
}

const fn default_poll_interval_ms() -> u64 {
    300
}

const fn default_idle_interval_ms() -> u64 {
    300
}

const fn default_reconnect_delay_ms() -> u64 {
    1000
}

/// Timing of the fetch stage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchConfig {
    /// Pause after a fetched batch has been handed to dispatch.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause after the server reported that nothing is available.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Pause between a failed fetch and the reconnect attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl FetchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Returns the pause before a reconnect attempt.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Options of one relay pipeline, immutable for the lifetime of the process.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking endpoint passwords. Use [`PipelineOptionsWithoutSecrets`] instead.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineOptions {
    /// Maximum number of entries requested per fetch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Logical name of the change source, copied onto every normalized change.
    #[serde(default = "default_destination")]
    pub destination: String,
    /// Subscription filter in `schema.table` regular expression form.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub mode: PipelineMode,
    /// Runs the three stage pipeline when `true`, the single loop otherwise.
    #[serde(rename = "async", default = "default_is_async")]
    pub is_async: bool,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub standalone: Option<StandaloneEndpoint>,
    #[serde(default)]
    pub cluster: Option<ClusterEndpoint>,
}

impl PipelineOptions {
    /// Builds options with defaults for everything but the mode and destination.
    ///
    /// Endpoint settings are left unset, so [`PipelineOptions::validate`] fails until
    /// the matching section is filled.
    pub fn new(destination: impl Into<String>, mode: PipelineMode, is_async: bool) -> Self {
        Self {
            batch_size: default_batch_size(),
            destination: destination.into(),
            filter: default_filter(),
            mode,
            is_async,
            fetch: FetchConfig::default(),
            standalone: None,
            cluster: None,
        }
    }

    /// Checks that the options describe a pipeline that can be started.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }

        if self.destination.trim().is_empty() {
            return Err(ValidationError::DestinationEmpty);
        }

        match self.mode {
            PipelineMode::Standalone => self
                .standalone
                .as_ref()
                .ok_or(ValidationError::MissingEndpoint {
                    mode: PipelineMode::Standalone.as_str(),
                    section: "standalone",
                })?
                .validate(),
            PipelineMode::Cluster => self
                .cluster
                .as_ref()
                .ok_or(ValidationError::MissingEndpoint {
                    mode: PipelineMode::Cluster.as_str(),
                    section: "cluster",
                })?
                .validate(),
        }
    }
}

impl Config for PipelineOptions {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Same as [`PipelineOptions`] but without secrets, safe to serialize.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineOptionsWithoutSecrets {
    pub batch_size: usize,
    pub destination: String,
    pub filter: String,
    pub mode: PipelineMode,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub fetch: FetchConfig,
    pub standalone: Option<StandaloneEndpointWithoutSecrets>,
    pub cluster: Option<ClusterEndpointWithoutSecrets>,
}

impl From<PipelineOptions> for PipelineOptionsWithoutSecrets {
    fn from(value: PipelineOptions) -> Self {
        PipelineOptionsWithoutSecrets {
            batch_size: value.batch_size,
            destination: value.destination,
            filter: value.filter,
            mode: value.mode,
            is_async: value.is_async,
            fetch: value.fetch,
            standalone: value.standalone.map(Into::into),
            cluster: value.cluster.map(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn standalone(host: &str) -> StandaloneEndpoint {
        StandaloneEndpoint {
            host: host.to_owned(),
            port: 11111,
            username: None,
            password: Some(SecretString::new("secret".to_owned())),
            so_timeout_ms: 60_000,
            idle_timeout_ms: 3_600_000,
        }
    }

    #[test]
    fn valid_standalone_options_pass() {
        let mut options = PipelineOptions::new("orders", PipelineMode::Standalone, true);
        options.standalone = Some(standalone("localhost"));

        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut options = PipelineOptions::new("orders", PipelineMode::Standalone, true);
        options.standalone = Some(standalone("localhost"));
        options.batch_size = 0;

        assert_eq!(options.validate(), Err(ValidationError::BatchSizeZero));
    }

    #[test]
    fn empty_destination_is_rejected() {
        let mut options = PipelineOptions::new("  ", PipelineMode::Standalone, true);
        options.standalone = Some(standalone("localhost"));

        assert_eq!(options.validate(), Err(ValidationError::DestinationEmpty));
    }

    #[test]
    fn mode_requires_matching_endpoint() {
        let mut options = PipelineOptions::new("orders", PipelineMode::Cluster, false);
        options.standalone = Some(standalone("localhost"));

        assert_eq!(
            options.validate(),
            Err(ValidationError::MissingEndpoint {
                mode: "cluster",
                section: "cluster",
            })
        );
    }

    #[test]
    fn blank_host_is_rejected() {
        let mut options = PipelineOptions::new("orders", PipelineMode::Standalone, true);
        options.standalone = Some(standalone(""));

        assert!(matches!(
            options.validate(),
            Err(ValidationError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn serialized_form_has_no_password() {
        let mut options = PipelineOptions::new("orders", PipelineMode::Standalone, true);
        options.standalone = Some(standalone("localhost"));

        let without_secrets: PipelineOptionsWithoutSecrets = options.into();
        let json = serde_json::to_string(&without_secrets).unwrap();

        assert!(json.contains("\"async\":true"));
        assert!(!json.contains("secret"));
    }
}
