//! Persistence configuration
//!
//! Retry policies and dual repository selection. Both load from environment
//! variables and can also be embedded in a host's serde config.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_MS: u64 = 100;

/// Reads an optional variable and parses it, failing on malformed values
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// =============================================================================
// Retry
// =============================================================================

/// Attempts and fixed backoff for one category of calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first
    pub max_attempts: u32,

    /// Pause between two attempts
    #[serde(with = "duration_ms")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Loads `{prefix}_MAX_ATTEMPTS` and `{prefix}_BACKOFF_MS`
    fn from_vars(lookup: &impl Fn(&str) -> Option<String>, prefix: &str) -> anyhow::Result<Self> {
        let max_attempts = parse_var::<u32>(lookup, &format!("{}_MAX_ATTEMPTS", prefix))?
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let backoff = parse_var::<u64>(lookup, &format!("{}_BACKOFF_MS", prefix))?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_BACKOFF_MS));

        Ok(Self {
            max_attempts,
            backoff,
        })
    }
}

/// Retry policies keyed by call category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceRetryConfig {
    pub read: RetryPolicy,
    pub write: RetryPolicy,
}

impl PersistenceRetryConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PERSISTENCE_RETRY_READ_MAX_ATTEMPTS (optional, default: 5)
    /// - PERSISTENCE_RETRY_READ_BACKOFF_MS (optional, default: 100)
    /// - PERSISTENCE_RETRY_WRITE_MAX_ATTEMPTS (optional, default: 5)
    /// - PERSISTENCE_RETRY_WRITE_BACKOFF_MS (optional, default: 100)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(env_lookup)
    }

    /// Same as [`Self::from_env`] with a custom variable source
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let config = Self {
            read: RetryPolicy::from_vars(&lookup, "PERSISTENCE_RETRY_READ")?,
            write: RetryPolicy::from_vars(&lookup, "PERSISTENCE_RETRY_WRITE")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.read.max_attempts == 0 {
            anyhow::bail!("read max_attempts must be greater than 0");
        }
        if self.write.max_attempts == 0 {
            anyhow::bail!("write max_attempts must be greater than 0");
        }
        Ok(())
    }
}

// =============================================================================
// Dual repository
// =============================================================================

/// Storage backends a repository can be registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[serde(alias = "memory")]
    InMemory,
    Sql,
    Redis,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::InMemory => write!(f, "in-memory"),
            BackendKind::Sql => write!(f, "sql"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BackendKind::InMemory),
            "sql" => Ok(BackendKind::Sql),
            "redis" => Ok(BackendKind::Redis),
            other => anyhow::bail!("Unknown repository backend: {}", other),
        }
    }
}

/// Which backends fill the primary and previous roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualRepositoryConfig {
    pub enabled: bool,
    pub primary: BackendKind,
    pub previous: BackendKind,
}

impl Default for DualRepositoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            primary: BackendKind::Sql,
            previous: BackendKind::Redis,
        }
    }
}

impl DualRepositoryConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - EXECUTION_REPOSITORY_DUAL_ENABLED (optional, default: false)
    /// - EXECUTION_REPOSITORY_DUAL_PRIMARY (optional, default: sql)
    /// - EXECUTION_REPOSITORY_DUAL_PREVIOUS (optional, default: redis)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(env_lookup)
    }

    /// Same as [`Self::from_env`] with a custom variable source
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let enabled = parse_var::<bool>(&lookup, "EXECUTION_REPOSITORY_DUAL_ENABLED")?
            .unwrap_or(defaults.enabled);
        let primary = lookup("EXECUTION_REPOSITORY_DUAL_PRIMARY")
            .map(|raw| raw.parse::<BackendKind>())
            .transpose()?
            .unwrap_or(defaults.primary);
        let previous = lookup("EXECUTION_REPOSITORY_DUAL_PREVIOUS")
            .map(|raw| raw.parse::<BackendKind>())
            .transpose()?
            .unwrap_or(defaults.previous);

        let config = Self {
            enabled,
            primary,
            previous,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled && self.primary == self.previous {
            anyhow::bail!(
                "Dual repository needs two distinct backends, got {} twice",
                self.primary
            );
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
