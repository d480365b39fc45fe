//! Relay configuration
//!
//! The configuration is a list of routes plus a few global settings. It can
//! be written in TOML:
//!
//! ```toml
//! [receive]
//! batch_size = 10
//! wait_time_secs = 20
//!
//! [[route]]
//! source = "https://sqs.eu-west-1.amazonaws.com/123456789012/incoming"
//! destinations = [
//!     "https://sqs.eu-west-1.amazonaws.com/123456789012/billing",
//!     "https://sqs.eu-west-1.amazonaws.com/123456789012/audit",
//! ]
//! interval_secs = 5
//! ```
//!
//! or in JSON, where the older `{"ProxyOps": [{"Src", "Dest", "Interval"}]}`
//! layout is also understood.

use std::{fmt, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, internal};

/// Largest batch a single receive call may ask for
pub const MAX_BATCH_SIZE: u8 = 10;

/// Longest long-poll a single receive call may ask for (in seconds)
pub const MAX_WAIT_TIME_SECS: u64 = 20;

const fn default_batch_size() -> u8 {
    MAX_BATCH_SIZE
}

const fn default_wait_time() -> u64 {
    MAX_WAIT_TIME_SECS
}

const fn default_visibility_timeout() -> u64 {
    30
}

/// One relay pairing: everything arriving on `source` is copied to each of
/// `destinations`, in order, before being removed from `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(alias = "src", alias = "Src")]
    pub source: String,

    /// Destinations are not deduplicated. An empty list drains `source`.
    #[serde(default, alias = "dest", alias = "Dest")]
    pub destinations: Vec<String>,

    /// Pause between polls (in seconds)
    #[serde(default, alias = "interval", alias = "Interval")]
    pub interval_secs: u64,
}

impl Route {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> [", self.source)?;
        for (index, destination) in self.destinations.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(destination)?;
        }
        write!(f, "] every {}s", self.interval_secs)
    }
}

/// The routes loaded at startup, in configuration order
///
/// Never modified once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteSet(Vec<Route>);

impl RouteSet {
    #[must_use]
    pub const fn new(routes: Vec<Route>) -> Self {
        Self(routes)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Route>> for RouteSet {
    fn from(routes: Vec<Route>) -> Self {
        Self(routes)
    }
}

impl<'a> IntoIterator for &'a RouteSet {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for RouteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("  (no routes)");
        }

        for (index, route) in self.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "  {route}")?;
        }
        Ok(())
    }
}

/// Receive parameters shared by every route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveSettings {
    /// Messages requested per receive call, at most [`MAX_BATCH_SIZE`]
    #[serde(default = "default_batch_size")]
    pub batch_size: u8,

    /// Long-poll duration per receive call (in seconds), at most
    /// [`MAX_WAIT_TIME_SECS`]
    #[serde(default = "default_wait_time")]
    pub wait_time_secs: u64,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            wait_time_secs: default_wait_time(),
        }
    }
}

impl ReceiveSettings {
    /// Batch size clamped to what the service accepts
    #[must_use]
    pub fn batch_size(&self) -> u8 {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Wait time clamped to what the service accepts
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs.min(MAX_WAIT_TIME_SECS))
    }
}

/// Which queue service to relay through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// Amazon SQS, configured from the environment
    Sqs {
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint_url: Option<String>,
    },

    /// In-process queues, declared from the routes. Useful for dry runs.
    Memory {
        #[serde(default = "default_visibility_timeout")]
        visibility_timeout_secs: u64,
    },
}

impl Default for Backend {
    fn default() -> Self {
        Self::Sqs {
            region: None,
            endpoint_url: None,
        }
    }
}

/// The complete relay configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default, alias = "route", alias = "ProxyOps")]
    pub routes: RouteSet,

    #[serde(default)]
    pub receive: ReceiveSettings,

    #[serde(default)]
    pub backend: Backend,
}

impl RelayConfig {
    /// Load the configuration at `path`.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    /// If the file cannot be read or does not parse
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::from_toml(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };

        config.check();
        Ok(config)
    }

    /// Parse a TOML configuration
    ///
    /// # Errors
    /// If `content` is not a valid configuration
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Parse a JSON configuration
    ///
    /// # Errors
    /// If `content` is not a valid configuration
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Warn about configurations that are valid but probably not intended.
    fn check(&self) {
        if self.routes.is_empty() {
            internal!(level = WARN, "Configuration contains no routes, nothing will be relayed");
        }

        for route in &self.routes {
            if route.destinations.is_empty() {
                internal!(
                    level = WARN,
                    "Route from {} has no destinations, its messages will be deleted without being forwarded",
                    route.source
                );
            }
        }

        if self.receive.batch_size() != self.receive.batch_size {
            internal!(
                level = WARN,
                "Batch size {} is outside 1..={MAX_BATCH_SIZE}, using {}",
                self.receive.batch_size,
                self.receive.batch_size()
            );
        }

        if self.receive.wait_time_secs > MAX_WAIT_TIME_SECS {
            internal!(
                level = WARN,
                "Wait time {}s exceeds {MAX_WAIT_TIME_SECS}s, using {MAX_WAIT_TIME_SECS}s",
                self.receive.wait_time_secs
            );
        }
    }
}

impl fmt::Display for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Backend::Sqs {
                region,
                endpoint_url,
            } => {
                write!(f, "Backend: sqs")?;
                if let Some(region) = region {
                    write!(f, " (region {region})")?;
                }
                if let Some(endpoint_url) = endpoint_url {
                    write!(f, " (endpoint {endpoint_url})")?;
                }
                writeln!(f)?;
            }
            Backend::Memory {
                visibility_timeout_secs,
            } => writeln!(
                f,
                "Backend: memory (visibility timeout {visibility_timeout_secs}s)"
            )?,
        }

        writeln!(
            f,
            "Receive: up to {} messages, waiting up to {}s",
            self.receive.batch_size(),
            self.receive.wait_time().as_secs()
        )?;
        writeln!(f, "Routes ({}):", self.routes.len())?;
        write!(f, "{}", self.routes)
    }
}
