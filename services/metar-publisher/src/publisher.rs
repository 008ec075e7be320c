//! Entity publishing to the Lattice platform.

use std::time::Duration;

use async_trait::async_trait;
use metar_common::{entity_id, EntitySnapshot};
use reqwest::{RequestBuilder, StatusCode};
use tracing::{debug, info, instrument};

use crate::config::LatticeCredentials;
use crate::error::{ConfigError, PublishError, StartupError};
use crate::lattice::LatticeEntity;

const SANDBOX_AUTH_HEADER: &str = "anduril-sandbox-authorization";
const ENTITIES_PATH: &str = "/api/v1/entities";
const MAX_ERROR_BODY: usize = 200;

/// Publishes one entity snapshot. Implementations must be idempotent per
/// entity id: publishing the same id again updates it in place.
#[async_trait]
pub trait EntityPublisher: Send + Sync {
    async fn publish(&self, snapshot: &EntitySnapshot) -> Result<(), PublishError>;

    /// Verify the platform is reachable and accepts our credentials.
    async fn preflight(&self) -> Result<(), StartupError> {
        Ok(())
    }
}

/// REST client for the Lattice entities API.
pub struct LatticePublisher {
    client: reqwest::Client,
    base_url: String,
    credentials: LatticeCredentials,
}

impl LatticePublisher {
    pub fn new(credentials: LatticeCredentials, timeout: Duration) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&credentials.url),
            credentials,
        })
    }

    pub fn entities_url(&self) -> String {
        format!("{}{}", self.base_url, ENTITIES_PATH)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.bearer_auth(&self.credentials.environment_token);
        match &self.credentials.sandboxes_token {
            Some(token) => request.header(SANDBOX_AUTH_HEADER, format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl EntityPublisher for LatticePublisher {
    #[instrument(skip_all, fields(entity_id = %snapshot.entity_id))]
    async fn publish(&self, snapshot: &EntitySnapshot) -> Result<(), PublishError> {
        let body = LatticeEntity::from(snapshot);
        let response = self
            .authorize(self.client.put(self.entities_url()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Entity accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(PublishError::from_status(status, truncate(&text, MAX_ERROR_BODY)))
    }

    /// Looks up the preflight entity. Any answer other than 401/403 proves the
    /// endpoint is reachable and the token is accepted; 404 is expected.
    async fn preflight(&self) -> Result<(), StartupError> {
        let url = format!("{}/{}", self.entities_url(), entity_id("PREFLIGHT"));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| StartupError::PlatformUnreachable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StartupError::Unauthorized(format!(
                "HTTP {} from {}",
                response.status().as_u16(),
                self.base_url
            ))),
            status if status.is_server_error() => Err(StartupError::PlatformUnreachable(format!(
                "HTTP {} from {}",
                status.as_u16(),
                self.base_url
            ))),
            status => {
                info!(url = %self.base_url, status = status.as_u16(), "Entity platform reachable");
                Ok(())
            }
        }
    }
}

/// Accepts bare host names as well as full URLs.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
