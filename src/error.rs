use crate::dns::ParseError;
use crate::provider::ProviderError;
use crate::zone::{ZoneError, ZoneName};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid DNS packet: {0}")]
    InvalidPacket(String),

    #[error("Upstream timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

impl From<ParseError> for DnsError {
    fn from(err: ParseError) -> Self {
        DnsError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid zone name {name}: {source}")]
    InvalidZone {
        name: String,
        #[source]
        source: ZoneError,
    },

    #[error("No zones configured")]
    NoZones,

    #[error("Missing Scaleway credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid scw config {path}: {message}")]
    Profile { path: String, message: String },
}

/// Why a single zone fetch failed
#[derive(Error, Debug)]
pub enum FetchFault {
    #[error("transport: {0}")]
    Transport(#[from] ProviderError),

    #[error("parse: {0}")]
    Parse(#[from] ZoneError),

    #[error("cancelled")]
    Cancelled,

    #[error("fetch task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
#[error("zone {zone}: {fault}")]
pub struct FetchError {
    pub zone: ZoneName,
    pub fault: FetchFault,
}

impl FetchError {
    pub fn new(zone: ZoneName, fault: impl Into<FetchFault>) -> Self {
        Self {
            zone,
            fault: fault.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.fault, FetchFault::Cancelled)
    }
}

/// Every per-zone failure from one refresh cycle
#[derive(Debug)]
pub struct RefreshError {
    pub succeeded: usize,
    pub failures: Vec<FetchError>,
}

impl RefreshError {
    /// True when every failure was a cancellation
    pub fn is_cancelled(&self) -> bool {
        !self.failures.is_empty() && self.failures.iter().all(FetchError::is_cancelled)
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} zones failed to refresh",
            self.failures.len(),
            self.succeeded + self.failures.len()
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for RefreshError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_error_lists_every_zone() {
        let err = RefreshError {
            succeeded: 1,
            failures: vec![
                FetchError::new(
                    ZoneName::new("a.test.").unwrap(),
                    ProviderError::Status {
                        status: 500,
                        body: "boom".to_string(),
                    },
                ),
                FetchError::new(ZoneName::new("b.test.").unwrap(), ZoneError::MissingSOA),
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("2 of 3 zones failed to refresh"));
        assert!(message.contains("zone a.test.: transport"));
        assert!(message.contains("zone b.test.: parse"));
        assert!(!err.is_cancelled());
    }
}
