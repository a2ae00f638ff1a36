use crate::authority::AuthoritySettings;
use crate::error::ConfigError;
use crate::fallthrough::FallthroughPolicy;
use crate::provider::Credentials;
use crate::zone::ZoneName;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub scaleway: ScalewayConfig,
    pub forward: ForwardConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the DNS listeners to
    pub bind_addr: SocketAddr,

    /// Zones to serve, in configuration order
    pub zones: Vec<String>,

    /// Zones whose misses go to the next handler (`*` for all)
    pub fallthrough: Vec<String>,

    /// Seconds between zone refreshes
    pub refresh_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 53)),
            zones: Vec::new(),
            fallthrough: Vec::new(),
            refresh_interval_secs: 60,
        }
    }
}

#[derive(Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScalewayConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub project_id: Option<String>,
    pub api_url: Option<String>,
    /// HTTP timeout for zone exports, in seconds
    pub timeout_secs: u64,
}

impl Default for ScalewayConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            project_id: None,
            api_url: None,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for ScalewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalewayConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForwardConfig {
    /// Upstream server for queries the zones do not answer
    pub upstream: Option<SocketAddr>,
    pub timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            upstream: None,
            timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load the optional config file, then apply `SCWDNS_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Override fields from environment-style variables looked up through `lookup`
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bind_addr) = lookup("SCWDNS_BIND_ADDR") {
            self.server.bind_addr = bind_addr
                .trim()
                .parse()
                .map_err(|_| invalid("SCWDNS_BIND_ADDR", &bind_addr))?;
        }

        if let Some(zones) = lookup("SCWDNS_ZONES") {
            self.server.zones = split_list(&zones);
        }

        if let Some(fallthrough) = lookup("SCWDNS_FALLTHROUGH") {
            self.server.fallthrough = split_list(&fallthrough);
        }

        if let Some(interval) = lookup("SCWDNS_REFRESH_INTERVAL") {
            self.server.refresh_interval_secs = interval
                .trim()
                .parse()
                .map_err(|_| invalid("SCWDNS_REFRESH_INTERVAL", &interval))?;
        }

        if let Some(upstream) = lookup("SCWDNS_UPSTREAM") {
            self.forward.upstream = if upstream.trim().is_empty() {
                None
            } else {
                Some(
                    upstream
                        .trim()
                        .parse()
                        .map_err(|_| invalid("SCWDNS_UPSTREAM", &upstream))?,
                )
            };
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.zones.is_empty() {
            return Err(ConfigError::NoZones);
        }
        self.zone_names()?;
        self.fallthrough_policy()?;

        if self.server.refresh_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.refresh_interval_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        for (field, secs) in [
            ("scaleway.timeout_secs", self.scaleway.timeout_secs),
            ("forward.timeout_secs", self.forward.timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 1 and {} seconds", MAX_TIMEOUT_SECS),
                });
            }
        }

        Ok(())
    }

    /// Normalized zone names, duplicates removed, order kept
    pub fn zone_names(&self) -> Result<Vec<ZoneName>, ConfigError> {
        let mut zones: Vec<ZoneName> = Vec::with_capacity(self.server.zones.len());
        for name in &self.server.zones {
            let zone = ZoneName::new(name).map_err(|source| ConfigError::InvalidZone {
                name: name.clone(),
                source,
            })?;
            if !zones.contains(&zone) {
                zones.push(zone);
            }
        }
        Ok(zones)
    }

    pub fn fallthrough_policy(&self) -> Result<FallthroughPolicy, ConfigError> {
        FallthroughPolicy::from_list(self.server.fallthrough.as_slice()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "server.fallthrough".to_string(),
                message: e.to_string(),
            }
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.server.refresh_interval_secs)
    }

    /// Credentials from the config file only; merge with the environment profile
    /// via [`Credentials::or`]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.scaleway.access_key.clone(),
            secret_key: self.scaleway.secret_key.clone(),
            project_id: self.scaleway.project_id.clone(),
            api_url: self.scaleway.api_url.clone(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.scaleway.timeout_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward.timeout_secs)
    }

    pub fn authority_settings(&self) -> Result<AuthoritySettings, ConfigError> {
        Ok(AuthoritySettings {
            zones: self.zone_names()?,
            fallthrough: self.fallthrough_policy()?,
            refresh_interval: self.refresh_interval(),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("cannot parse {:?}", value),
    }
}
