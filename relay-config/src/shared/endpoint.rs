use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

const fn default_standalone_port() -> u16 {
    11111
}

const fn default_so_timeout_ms() -> u64 {
    60_000
}

const fn default_idle_timeout_ms() -> u64 {
    3_600_000
}

/// Settings for a single change-capture server reached directly by address.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the password.
#[derive(Clone, Debug, Deserialize)]
pub struct StandaloneEndpoint {
    pub host: String,
    #[serde(default = "default_standalone_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Socket read timeout.
    #[serde(default = "default_so_timeout_ms")]
    pub so_timeout_ms: u64,
    /// Time after which an idle connection is considered dead by the server.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl StandaloneEndpoint {
    /// Checks that the host is set and the port is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::InvalidEndpoint(
                "`standalone.host` cannot be empty".to_owned(),
            ));
        }

        if self.port == 0 {
            return Err(ValidationError::InvalidEndpoint(
                "`standalone.port` cannot be zero".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Settings for a highly available server group discovered through ZooKeeper.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the password.
#[derive(Clone, Debug, Deserialize)]
pub struct ClusterEndpoint {
    /// Comma separated `host:port` list of the coordination service.
    pub zk_address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default = "default_so_timeout_ms")]
    pub so_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl ClusterEndpoint {
    /// Checks that the coordination address is set.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.zk_address.trim().is_empty() {
            return Err(ValidationError::InvalidEndpoint(
                "`cluster.zk_address` cannot be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Same as [`StandaloneEndpoint`] without the password, safe to serialize.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StandaloneEndpointWithoutSecrets {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub so_timeout_ms: u64,
    pub idle_timeout_ms: u64,
}

impl From<StandaloneEndpoint> for StandaloneEndpointWithoutSecrets {
    fn from(value: StandaloneEndpoint) -> Self {
        StandaloneEndpointWithoutSecrets {
            host: value.host,
            port: value.port,
            username: value.username,
            so_timeout_ms: value.so_timeout_ms,
            idle_timeout_ms: value.idle_timeout_ms,
        }
    }
}

/// Same as [`ClusterEndpoint`] without the password, safe to serialize.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterEndpointWithoutSecrets {
    pub zk_address: String,
    pub username: Option<String>,
    pub so_timeout_ms: u64,
    pub idle_timeout_ms: u64,
}

impl From<ClusterEndpoint> for ClusterEndpointWithoutSecrets {
    fn from(value: ClusterEndpoint) -> Self {
        ClusterEndpointWithoutSecrets {
            zk_address: value.zk_address,
            username: value.username,
            so_timeout_ms: value.so_timeout_ms,
            idle_timeout_ms: value.idle_timeout_ms,
        }
    }
}
