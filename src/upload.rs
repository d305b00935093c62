//! Upload Client
//!
//! Durable put of a rendered snapshot document to keyed object
//! storage. The key addresses one user and calendar day, so re-uploads
//! overwrite cleanly and retries are always safe; the remote store
//! commits each put atomically, so readers never observe a partial
//! object.

use crate::auth::{AuthError, AuthGate};
use crate::formatter::UploadDocument;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use std::sync::{Arc, RwLock};

/// Upload failure taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadError {
    /// Credentials were rejected. The client refreshes and retries
    /// once before surfacing this.
    #[error("upload credentials rejected")]
    Unauthorized,

    /// Network or service fault. The caller may retry with backoff;
    /// there is no retry loop inside the client.
    #[error("transient upload failure: {0}")]
    Transient(String),

    /// Malformed payload or request. Not retryable.
    #[error("invalid upload: {0}")]
    Invalid(String),
}

/// Short-lived credentials accepted by the object store.
#[derive(Debug, Clone)]
pub struct UploadCredentials {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Supplies upload credentials derived from the identity token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current credentials, minting new ones if the cache is stale.
    async fn credentials(&self) -> Result<UploadCredentials, AuthError>;

    /// Discard any cached credentials and mint fresh ones.
    async fn refresh(&self) -> Result<UploadCredentials, AuthError>;
}

/// Seam the scheduler uploads through; implemented by [`UploadClient`]
/// and by test doubles.
#[async_trait]
pub trait SnapshotUploader: Send + Sync {
    async fn put(&self, document: &UploadDocument) -> Result<(), UploadError>;
}

/// Object store destination.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Base URL of the object store API.
    pub endpoint: String,
    /// Bucket holding one object per user per day.
    pub bucket: String,
    pub request_timeout_ms: u64,
}

/// [`CredentialProvider`] that exchanges the identity token for
/// short-lived storage credentials at a federation endpoint. Cached
/// credentials are reused until within five minutes of expiry.
pub struct ExchangeCredentialProvider {
    client: reqwest::Client,
    exchange_url: String,
    gate: Arc<AuthGate>,
    cached: RwLock<Option<UploadCredentials>>,
}

impl ExchangeCredentialProvider {
    pub fn new(exchange_url: String, gate: Arc<AuthGate>) -> Self {
        Self {
            client: reqwest::Client::new(),
            exchange_url,
            gate,
            cached: RwLock::new(None),
        }
    }

    async fn exchange(&self) -> Result<UploadCredentials, AuthError> {
        let token = self.gate.ensure_fresh().await?;

        let response = self
            .client
            .post(&self.exchange_url)
            .json(&serde_json::json!({ "identity_token": token.as_str() }))
            .send()
            .await
            .map_err(|e| AuthError::SignInFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::SignInFailed(format!(
                "credential exchange returned {}",
                response.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct ExchangeResponse {
            access_token: String,
            expires_in: i64,
        }

        let body: ExchangeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::SignInFailed(e.to_string()))?;

        let credentials = UploadCredentials {
            access_token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        };

        *self.cached.write().unwrap() = Some(credentials.clone());
        tracing::debug!("Minted fresh upload credentials");
        Ok(credentials)
    }
}

#[async_trait]
impl CredentialProvider for ExchangeCredentialProvider {
    async fn credentials(&self) -> Result<UploadCredentials, AuthError> {
        let cached = self.cached.read().unwrap().clone();
        match cached {
            Some(creds) if creds.expires_at > Utc::now() + Duration::minutes(5) => Ok(creds),
            _ => self.exchange().await,
        }
    }

    async fn refresh(&self) -> Result<UploadCredentials, AuthError> {
        *self.cached.write().unwrap() = None;
        self.exchange().await
    }
}

/// HTTP client for keyed object-store puts.
pub struct UploadClient {
    client: reqwest::Client,
    config: ObjectStoreConfig,
    provider: Arc<dyn CredentialProvider>,
}

impl UploadClient {
    pub fn new(config: ObjectStoreConfig, provider: Arc<dyn CredentialProvider>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            provider,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.config.endpoint, self.config.bucket, key)
    }

    async fn put_once(
        &self,
        key: &str,
        body: &[u8],
        credentials: &UploadCredentials,
    ) -> Result<(), UploadError> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&credentials.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_LENGTH, body.len())
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| UploadError::Transient(e.to_string()))?;

        classify_status(response.status())
    }
}

#[async_trait]
impl SnapshotUploader for UploadClient {
    async fn put(&self, document: &UploadDocument) -> Result<(), UploadError> {
        let body = document
            .to_bytes()
            .map_err(|e| UploadError::Invalid(e.to_string()))?;

        tracing::info!(
            key = %document.key,
            bytes = body.len(),
            "Uploading snapshot document"
        );

        let credentials = self
            .provider
            .credentials()
            .await
            .map_err(|_| UploadError::Unauthorized)?;

        match self.put_once(&document.key, &body, &credentials).await {
            Err(UploadError::Unauthorized) => {
                // One refresh-and-retry before surfacing
                tracing::warn!(key = %document.key, "Credentials rejected, refreshing once");
                let credentials = self
                    .provider
                    .refresh()
                    .await
                    .map_err(|_| UploadError::Unauthorized)?;
                self.put_once(&document.key, &body, &credentials).await
            }
            other => other,
        }
    }
}

/// Map an object-store response status to the upload taxonomy.
fn classify_status(status: StatusCode) -> Result<(), UploadError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UploadError::Unauthorized),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => {
            Err(UploadError::Invalid(format!("object store returned {status}")))
        }
        _ => Err(UploadError::Transient(format!(
            "object store returned {status}"
        ))),
    }
}
