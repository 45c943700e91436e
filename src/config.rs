//! Relay and client configuration.
//!
//! Runtime configs (`RelayConfig`, `ClientConfig`) are built from a TOML
//! `ConfigFile` whose every field has a default, so an empty file (or no file
//! at all) reproduces the stock deployment: listen on `localhost:5432` and
//! `localhost:443`, client dials `localhost:443` then `localhost:5432`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::forward::ForwardOptions;

/// Default host for listening and dialing.
pub const DEFAULT_HOST: &str = "localhost";
/// Default first (service) port.
pub const DEFAULT_SERVICE_PORT: u16 = 5432;
/// Default second (public) port.
pub const DEFAULT_PUBLIC_PORT: u16 = 443;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen host
    pub host: String,
    /// Port bound first
    pub service_port: u16,
    /// Port bound second
    pub public_port: u16,
    /// Forwarding loop tuning
    pub forward: ForwardOptions,
}

impl RelayConfig {
    /// Create a configuration for the given host and ports.
    pub fn new(host: impl Into<String>, service_port: u16, public_port: u16) -> Self {
        Self {
            host: host.into(),
            service_port,
            public_port,
            forward: ForwardOptions::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("host cannot be empty"));
        }
        // Port 0 asks the OS for an ephemeral port, so two zeros are fine.
        if self.service_port == self.public_port && self.service_port != 0 {
            return Err(Error::config("public_port must differ from service_port"));
        }
        validate_forward(&self.forward)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_SERVICE_PORT, DEFAULT_PUBLIC_PORT)
    }
}

/// A host and port to dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client mode configuration: one fixed pair for the process lifetime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Dialed first
    pub first: Endpoint,
    /// Dialed second
    pub second: Endpoint,
    /// Forwarding loop tuning
    pub forward: ForwardOptions,
}

impl ClientConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for endpoint in [&self.first, &self.second] {
            if endpoint.host.is_empty() {
                return Err(Error::config("endpoint host cannot be empty"));
            }
            if endpoint.port == 0 {
                return Err(Error::config(format!("{}: port cannot be 0", endpoint)));
            }
        }
        validate_forward(&self.forward)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            first: Endpoint::new(DEFAULT_HOST, DEFAULT_PUBLIC_PORT),
            second: Endpoint::new(DEFAULT_HOST, DEFAULT_SERVICE_PORT),
            forward: ForwardOptions::default(),
        }
    }
}

fn validate_forward(options: &ForwardOptions) -> Result<()> {
    if options.chunk_size == 0 {
        return Err(Error::config("chunk_size must be at least 1"));
    }
    Ok(())
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Listen host
    pub host: String,
    /// Port bound first
    pub service_port: u16,
    /// Port bound second
    pub public_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            service_port: DEFAULT_SERVICE_PORT,
            public_port: DEFAULT_PUBLIC_PORT,
        }
    }
}

/// `[client]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    /// Dialed first
    pub first: Endpoint,
    /// Dialed second
    pub second: Endpoint,
}

impl Default for ClientSection {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            first: defaults.first,
            second: defaults.second,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Directory for timestamped log files; stdout only when unset
    pub dir: Option<PathBuf>,
}

/// Configuration file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Relay listeners
    pub server: ServerSection,
    /// Client mode endpoints
    pub client: ClientSection,
    /// Forwarding loop tuning, shared by both modes
    pub forward: ForwardOptions,
    /// Log output
    pub log: LogSection,
}

impl ConfigFile {
    /// Parse a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Apply `RENDEZVOUS_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("RENDEZVOUS_HOST") {
            self.server.host = host;
        }
        if let Some(p) = lookup("RENDEZVOUS_SERVICE_PORT").and_then(|s| s.parse().ok()) {
            self.server.service_port = p;
        }
        if let Some(p) = lookup("RENDEZVOUS_PUBLIC_PORT").and_then(|s| s.parse().ok()) {
            self.server.public_port = p;
        }
        if let Some(dir) = lookup("RENDEZVOUS_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(dir));
        }
    }

    /// Convert to relay configuration.
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            host: self.server.host.clone(),
            service_port: self.server.service_port,
            public_port: self.server.public_port,
            forward: self.forward.clone(),
        }
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            first: self.client.first.clone(),
            second: self.client.second.clone(),
            forward: self.forward.clone(),
        }
    }
}
