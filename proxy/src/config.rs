//! Proxy configuration loaded from a TOML file
//!
//! Every field has a default so an absent or partial file still yields a
//! usable configuration. The routing policy for status queries also lives
//! here since it is a pure function of the configured host mappings.

use crate::error::{ProxyError, Result};
use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// How status queries are answered when backends are available.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Answer from local configuration only.
    #[default]
    Disabled,
    /// Local answer with the first backend's mod list spliced in.
    #[serde(alias = "mods")]
    ModsOnly,
    /// Local version and player counts with the first backend's description.
    #[serde(alias = "description")]
    DescriptionOnly,
    /// The first backend answer, verbatim.
    All,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    pub bind: String,
    pub motd: String,
    pub show_max_players: i32,
    pub favicon: Option<String>,
    pub announce_forge: bool,
    pub ping_passthrough: MergePolicy,
    pub show_ping_requests: bool,
    pub attempt_connection_order: Vec<String>,
    pub forced_hosts: BTreeMap<String, Vec<String>>,
    pub servers: BTreeMap<String, String>,
    pub probe_timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:25577".to_string(),
            motd: "A Relay Server".to_string(),
            show_max_players: 500,
            favicon: None,
            announce_forge: false,
            ping_passthrough: MergePolicy::Disabled,
            show_ping_requests: false,
            attempt_connection_order: vec!["lobby".to_string()],
            forced_hosts: BTreeMap::new(),
            servers: BTreeMap::new(),
            probe_timeout_ms: 2500,
        }
    }
}

impl ProxyConfig {
    /// Reads the configuration at `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ProxyConfig =
            toml::from_str(text).map_err(|e| ProxyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        for (name, addr) in &self.servers {
            addr.parse::<SocketAddr>().map_err(|e| {
                ProxyError::Config(format!("server {} has invalid address {}: {}", name, addr, e))
            })?;
        }

        if self.probe_timeout_ms == 0 {
            return Err(ProxyError::Config(
                "probe_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| ProxyError::Config(format!("invalid bind address {}: {}", self.bind, e)))
    }

    /// Replaces the host and/or port of `bind`, keeping whichever part is
    /// not given.
    pub fn override_bind(&mut self, host: Option<&str>, port: Option<u16>) -> Result<()> {
        let current = self.bind_addr()?;
        let ip = match host {
            Some(host) => host
                .parse::<IpAddr>()
                .map_err(|e| ProxyError::Config(format!("invalid bind host {}: {}", host, e)))?,
            None => current.ip(),
        };
        let addr = SocketAddr::new(ip, port.unwrap_or(current.port()));
        self.bind = addr.to_string();
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Ordered backend names to try for a client that connected through
    /// `virtual_host`. Forced hosts win; otherwise the default order applies.
    pub fn servers_for_host(&self, virtual_host: Option<&str>) -> Vec<String> {
        let host = virtual_host.unwrap_or("");
        self.forced_hosts
            .iter()
            .find(|(forced, _)| forced.eq_ignore_ascii_case(host))
            .map(|(_, servers)| servers.clone())
            .unwrap_or_else(|| self.attempt_connection_order.clone())
    }
}
