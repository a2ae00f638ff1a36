use super::{ProviderError, ZoneProvider};
use crate::error::ConfigError;
use crate::zone::ZoneName;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_API_URL: &str = "https://api.scaleway.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Scaleway API credentials; unset fields may be filled from the scw profile
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub project_id: Option<String>,
    pub api_url: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Credentials {
    /// Read the standard `SCW_*` profile variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            access_key: get("SCW_ACCESS_KEY"),
            secret_key: get("SCW_SECRET_KEY"),
            project_id: get("SCW_DEFAULT_PROJECT_ID"),
            api_url: get("SCW_API_URL"),
        }
    }

    /// Fill unset fields from `fallback`; values already present win
    pub fn or(self, fallback: Credentials) -> Self {
        Self {
            access_key: self.access_key.or(fallback.access_key),
            secret_key: self.secret_key.or(fallback.secret_key),
            project_id: self.project_id.or(fallback.project_id),
            api_url: self.api_url.or(fallback.api_url),
        }
    }
}

/// Body of `GET /domain/v2beta1/dns-zones/{zone}/raw`
#[derive(Debug, Deserialize)]
struct RawZoneExport {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    content: String,
}

/// Zone provider backed by the Scaleway Domains API
pub struct ScalewayClient {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl ScalewayClient {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, ConfigError> {
        let secret_key = credentials
            .secret_key
            .ok_or(ConfigError::MissingCredential("secret_key"))?;
        let api_url = credentials
            .api_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scwdns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "scaleway".to_string(),
                message: e.to_string(),
            })?;

        debug!(
            "Scaleway client for {} (access key: {}, project: {})",
            api_url,
            credentials.access_key.as_deref().unwrap_or("-"),
            credentials.project_id.as_deref().unwrap_or("-")
        );

        Ok(Self {
            client,
            api_url,
            secret_key,
        })
    }

    pub fn export_url(&self, zone: &ZoneName) -> String {
        format!(
            "{}/domain/v2beta1/dns-zones/{}/raw?format=bind",
            self.api_url,
            zone.api_name()
        )
    }
}

#[async_trait]
impl ZoneProvider for ScalewayClient {
    fn name(&self) -> &str {
        "scaleway"
    }

    async fn export_zone(&self, zone: &ZoneName) -> Result<Vec<u8>, ProviderError> {
        let url = self.export_url(zone);
        trace!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).chars().take(512).collect(),
            });
        }

        decode_export(&body)
    }
}

/// Extract the master file from the JSON export envelope
pub fn decode_export(body: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let export: RawZoneExport =
        serde_json::from_slice(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    trace!(
        "Decoded export of {:?} ({:?})",
        export.name,
        export.content_type
    );
    STANDARD
        .decode(export.content.trim())
        .map_err(|e| ProviderError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_export() {
        let content = STANDARD.encode("$ORIGIN example.com.\n");
        let body = format!(
            r#"{{"name":"example.com","content_type":"text/plain","content":"{}"}}"#,
            content
        );
        assert_eq!(
            decode_export(body.as_bytes()).unwrap(),
            b"$ORIGIN example.com.\n".to_vec()
        );
    }

    #[test]
    fn test_decode_export_rejects_garbage() {
        assert!(matches!(
            decode_export(b"<html>"),
            Err(ProviderError::Decode(_))
        ));
        assert!(matches!(
            decode_export(br#"{"content":"%%%"}"#),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_config_values_win_over_environment() {
        let env = Credentials::from_lookup(|key| match key {
            "SCW_ACCESS_KEY" => Some("SCWENV".to_string()),
            "SCW_SECRET_KEY" => Some("env-secret".to_string()),
            "SCW_DEFAULT_PROJECT_ID" => Some("".to_string()),
            _ => None,
        });
        let configured = Credentials {
            secret_key: Some("file-secret".to_string()),
            ..Default::default()
        };
        let merged = configured.or(env);
        assert_eq!(merged.secret_key.as_deref(), Some("file-secret"));
        assert_eq!(merged.access_key.as_deref(), Some("SCWENV"));
        assert_eq!(merged.project_id, None);
        assert!(!format!("{:?}", merged).contains("file-secret"));
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        assert!(matches!(
            ScalewayClient::new(Credentials::default(), DEFAULT_TIMEOUT),
            Err(ConfigError::MissingCredential("secret_key"))
        ));
    }

    #[test]
    fn test_export_url() {
        let client = ScalewayClient::new(
            Credentials {
                secret_key: Some("secret".to_string()),
                api_url: Some("http://127.0.0.1:8080/".to_string()),
                ..Default::default()
            },
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        let zone = ZoneName::new("Example.com").unwrap();
        assert_eq!(
            client.export_url(&zone),
            "http://127.0.0.1:8080/domain/v2beta1/dns-zones/example.com/raw?format=bind"
        );
    }
}
