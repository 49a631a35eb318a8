//! nodecycled.toml configuration.
//!
//! ```toml
//! [settings]
//! drift_enabled = true
//!
//! [deprovisioning]
//! interval = "10s"
//! replacement_timeout = "10m"
//!
//! [gc]
//! interval = "60s"
//! presence_ttl = "10m"
//!
//! [provider]
//! endpoint = "http://127.0.0.1:9000"
//! timeout = "5s"
//!
//! [server]
//! port = 8080
//!
//! [state]
//! path = "/var/lib/nodecycle/state.redb"
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use nodecycle_deprovision::Settings;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub deprovisioning: DeprovisioningConfig,
    pub gc: GcConfig,
    pub provider: ProviderConfig,
    pub server: ServerConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeprovisioningConfig {
    #[serde(deserialize_with = "duration")]
    pub interval: Duration,
    /// How long a replaced node waits for its replacements to be created
    /// before they are given up on.
    #[serde(deserialize_with = "duration")]
    pub replacement_timeout: Duration,
}

impl Default for DeprovisioningConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            replacement_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    #[serde(deserialize_with = "duration")]
    pub interval: Duration,
    /// How long a confirmed-present machine is trusted before re-asking.
    #[serde(deserialize_with = "duration")]
    pub presence_ttl: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            presence_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider inventory service.
    pub endpoint: String,
    #[serde(deserialize_with = "duration")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ProviderConfig {
    /// Split the endpoint into `host:port` and the instance path prefix.
    pub fn address_and_prefix(&self) -> anyhow::Result<(String, String)> {
        let uri: axum::http::Uri = self
            .endpoint
            .parse()
            .with_context(|| format!("invalid provider endpoint {:?}", self.endpoint))?;
        if uri.scheme_str().is_some_and(|s| s != "http") {
            anyhow::bail!("provider endpoint must use http: {}", self.endpoint);
        }
        let authority = uri
            .authority()
            .with_context(|| format!("provider endpoint has no host: {}", self.endpoint))?;
        let address = match authority.port_u16() {
            Some(_) => authority.to_string(),
            None => format!("{}:80", authority.host()),
        };
        let base = uri.path().trim_end_matches('/');
        Ok((address, format!("{base}/instances")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/nodecycle/state.redb"),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Parse "500ms", "30s", "10m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse().ok().map(Duration::from_secs)
    }
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration {raw:?}")))
}
