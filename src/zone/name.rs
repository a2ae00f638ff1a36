use super::{Result, ZoneError};
use crate::dns::common::MAX_NAME_LENGTH;
use std::fmt;
use std::str::FromStr;

const MAX_LABEL_LENGTH: usize = 63;

/// A fully-qualified, lowercase zone name with a trailing dot
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneName(String);

impl ZoneName {
    pub fn new(name: &str) -> Result<Self> {
        let normalized = normalize_name(name);
        validate_name(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name without its trailing dot, as the Scaleway API expects it
    pub fn api_name(&self) -> &str {
        let trimmed = self.0.trim_end_matches('.');
        if trimmed.is_empty() { "." } else { trimmed }
    }

    /// True when `name` (normalized) is this zone or below it
    pub fn contains(&self, name: &str) -> bool {
        is_subdomain_of(name, &self.0)
    }

    pub fn label_count(&self) -> usize {
        label_count(&self.0)
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ZoneName {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for ZoneName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase and add the trailing dot
pub fn normalize_name(name: &str) -> String {
    let mut name = name.trim().to_ascii_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

/// Both arguments must already be normalized
pub fn is_subdomain_of(name: &str, zone: &str) -> bool {
    if zone == "." || name == zone {
        return true;
    }
    name.len() > zone.len()
        && name.ends_with(zone)
        && name.as_bytes()[name.len() - zone.len() - 1] == b'.'
}

pub fn label_count(name: &str) -> usize {
    name.split('.').filter(|l| !l.is_empty()).count()
}

/// Parent of a normalized name; `None` for the root
pub fn parent_name(name: &str) -> Option<String> {
    if name == "." {
        return None;
    }
    match name.find('.') {
        Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_string()),
        _ => Some(".".to_string()),
    }
}

/// Pick the most specific zone that contains `qname`
pub fn longest_match<'a>(zones: &'a [ZoneName], qname: &str) -> Option<&'a ZoneName> {
    let qname = normalize_name(qname);
    zones
        .iter()
        .filter(|zone| zone.contains(&qname))
        .max_by_key(|zone| zone.label_count())
}

/// Resolve a zone-file name against `origin`
pub fn absolute_name(name: &str, origin: &str) -> Result<String> {
    let absolute = if name == "@" {
        origin.to_string()
    } else if name.ends_with('.') {
        name.to_ascii_lowercase()
    } else if origin == "." {
        format!("{}.", name.to_ascii_lowercase())
    } else {
        format!("{}.{}", name.to_ascii_lowercase(), origin)
    };
    validate_name(&absolute)?;
    Ok(absolute)
}

fn validate_name(name: &str) -> Result<()> {
    if name == "." {
        return Ok(());
    }
    let body = name.strip_suffix('.').unwrap_or(name);
    let mut wire_len = 1;
    for label in body.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
            return Err(ZoneError::InvalidDomainName(name.to_string()));
        }
        wire_len += label.len() + 1;
    }
    if wire_len > MAX_NAME_LENGTH {
        return Err(ZoneError::InvalidDomainName(name.to_string()));
    }
    Ok(())
}
