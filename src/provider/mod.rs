pub mod profile;
pub mod scaleway;

use crate::zone::ZoneName;
use async_trait::async_trait;
use thiserror::Error;

pub use scaleway::{Credentials, ScalewayClient};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("could not decode zone export: {0}")]
    Decode(String),
}

/// Source of serialized zone documents
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Fetch the full master-file export of `zone`
    async fn export_zone(&self, zone: &ZoneName) -> Result<Vec<u8>, ProviderError>;
}
