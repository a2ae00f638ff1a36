//! Credentials from the `scw` CLI configuration file.
//!
//! Layers, lowest priority first: the active profile of
//! `~/.config/scw/config.yaml` (or `$SCW_CONFIG_PATH`), then the `SCW_*`
//! environment profile. Values from our own config file are applied on top by
//! the caller through [`Credentials::or`].

use super::Credentials;
use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Profile {
    access_key: Option<String>,
    secret_key: Option<String>,
    default_project_id: Option<String>,
    api_url: Option<String>,
}

impl From<Profile> for Credentials {
    fn from(profile: Profile) -> Self {
        let keep = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Credentials {
            access_key: keep(profile.access_key),
            secret_key: keep(profile.secret_key),
            project_id: keep(profile.default_project_id),
            api_url: keep(profile.api_url),
        }
    }
}

/// Layout of the scw CLI config: a default profile at the top level plus named ones
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScwConfig {
    #[serde(flatten)]
    default: Profile,
    active_profile: Option<String>,
    profiles: HashMap<String, Profile>,
}

impl Credentials {
    /// Merge the scw config file's active profile with the `SCW_*` environment
    pub fn load_profile() -> Result<Self, ConfigError> {
        Self::from_profile_lookup(|key| std::env::var(key).ok())
    }

    /// [`Credentials::load_profile`] with environment access through `lookup`
    pub fn from_profile_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match scw_config_path(&lookup) {
            Some(path) => {
                let active = lookup("SCW_PROFILE").filter(|p| !p.trim().is_empty());
                Self::from_scw_config(&path, active.as_deref())?
            }
            None => Self::default(),
        };
        Ok(Self::from_lookup(lookup).or(file))
    }

    /// Active profile of the scw config at `path`; a missing file is an empty profile.
    ///
    /// `active` overrides the file's `active_profile`. Named profiles inherit
    /// unset values from the top-level default profile.
    pub fn from_scw_config(path: &Path, active: Option<&str>) -> Result<Self, ConfigError> {
        let profile_error = |message: String| ConfigError::Profile {
            path: path.display().to_string(),
            message,
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No scw config at {}, using an empty profile", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(profile_error(e.to_string())),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut config: ScwConfig =
            serde_yaml::from_str(&contents).map_err(|e| profile_error(e.to_string()))?;
        let default = Credentials::from(std::mem::take(&mut config.default));

        let Some(name) = active.map(str::to_string).or(config.active_profile) else {
            return Ok(default);
        };
        let named = config
            .profiles
            .remove(&name)
            .ok_or_else(|| profile_error(format!("profile {} not found", name)))?;
        debug!("Using scw profile {} from {}", name, path.display());
        Ok(Credentials::from(named).or(default))
    }
}

/// `$SCW_CONFIG_PATH`, else `$XDG_CONFIG_HOME/scw/config.yaml`, else `~/.config/scw/config.yaml`
fn scw_config_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(path) = non_empty("SCW_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Some(Path::new(&xdg).join("scw").join("config.yaml"));
    }
    non_empty("HOME").map(|home| Path::new(&home).join(".config").join("scw").join("config.yaml"))
}
