//! Authentication Gate
//!
//! Holds the signed identity token and gates every privileged
//! operation behind it. Before each use the token's remaining validity
//! is checked against a one-hour freshness threshold; a stale token
//! forces a refresh through the external sign-in collaborator before
//! the operation proceeds. Only one refresh is ever in flight -
//! concurrent callers await it rather than issuing duplicates.

use crate::profile::ProfileStore;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Minimum remaining validity below which a refresh is forced.
pub fn freshness_threshold() -> Duration {
    Duration::hours(1)
}

/// Authentication failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("not signed in")]
    SignedOut,

    #[error("re-authentication required: {0}")]
    ReauthRequired(String),

    #[error("sign-in failed: {0}")]
    SignInFailed(String),
}

/// An opaque signed identity token with an embedded expiry claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expiry extracted from the token's middle segment.
    ///
    /// The segment is base64url-decoded and its numeric `exp` claim
    /// read as a Unix timestamp. Returns `None` for anything that
    /// fails to decode.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        let mut segments = self.0.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return None,
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        let exp = claims.get("exp")?.as_f64()?;
        Utc.timestamp_opt(exp as i64, 0).single()
    }

    /// Whether the token's remaining validity at `now` is under
    /// `threshold`. An undecodable token is treated as already expired
    /// - never as silently trustworthy.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.expiration() {
            Some(expiry) => expiry - now < threshold,
            None => true,
        }
    }

    /// Freshness check against the fixed one-hour threshold.
    pub fn is_expiring_soon(&self) -> bool {
        self.expires_within(Utc::now(), freshness_threshold())
    }
}

/// Authentication state machine.
///
/// `SignedOut -> Authenticating -> Authenticated -> Refreshing ->
/// Authenticated`, falling back to `SignedOut` on hard auth failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    Authenticating,
    Authenticated(IdentityToken),
    Refreshing,
}

/// External sign-in collaborator: produces a fresh identity token,
/// interactively or via a refresh exchange.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn reauthenticate(&self) -> Result<IdentityToken, AuthError>;
}

/// Gates privileged operations behind a valid, fresh identity token.
pub struct AuthGate {
    state: RwLock<AuthState>,
    refresher: Arc<dyn TokenRefresher>,
    // Single-flight: concurrent refreshers queue here
    refresh_lock: Mutex<()>,
    profile: Option<Arc<ProfileStore>>,
}

impl AuthGate {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            state: RwLock::new(AuthState::SignedOut),
            refresher,
            refresh_lock: Mutex::new(()),
            profile: None,
        }
    }

    /// Attach a profile store and restore any cached token from it.
    /// The restored token may already be stale; `ensure_fresh` handles
    /// that on first use.
    pub fn with_profile(mut self, profile: Arc<ProfileStore>) -> Self {
        if let Ok(Some(raw)) = profile.identity_token() {
            self.state = RwLock::new(AuthState::Authenticated(IdentityToken::new(raw)));
        }
        self.profile = Some(profile);
        self
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// Explicit sign-in. Drives `SignedOut -> Authenticating ->
    /// Authenticated`, or back to `SignedOut` on failure.
    pub async fn sign_in(&self) -> Result<IdentityToken, AuthError> {
        *self.state.write().await = AuthState::Authenticating;

        match self.refresher.reauthenticate().await {
            Ok(token) => {
                self.store_token(&token).await;
                tracing::info!("Sign-in complete");
                Ok(token)
            }
            Err(e) => {
                *self.state.write().await = AuthState::SignedOut;
                tracing::warn!(error = %e, "Sign-in failed");
                Err(e)
            }
        }
    }

    /// Accept a token obtained out-of-band (e.g. pasted into the CLI
    /// after an external browser sign-in).
    pub async fn adopt_token(&self, token: IdentityToken) {
        self.store_token(&token).await;
    }

    /// Entry point for every privileged operation.
    ///
    /// Returns the current token when it is fresh; otherwise refreshes
    /// first, blocking the caller until the single in-flight refresh
    /// settles. A failed refresh signs the gate out and the operation
    /// fails with [`AuthError::ReauthRequired`].
    pub async fn ensure_fresh(&self) -> Result<IdentityToken, AuthError> {
        if let AuthState::Authenticated(token) = &*self.state.read().await {
            if !token.is_expiring_soon() {
                return Ok(token.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        match &*self.state.read().await {
            AuthState::Authenticated(token) if !token.is_expiring_soon() => {
                return Ok(token.clone());
            }
            AuthState::SignedOut => return Err(AuthError::SignedOut),
            _ => {}
        }

        *self.state.write().await = AuthState::Refreshing;
        tracing::info!("Identity token expiring soon, refreshing");

        match self.refresher.reauthenticate().await {
            Ok(token) => {
                self.store_token(&token).await;
                Ok(token)
            }
            Err(e) => {
                *self.state.write().await = AuthState::SignedOut;
                tracing::warn!(error = %e, "Token refresh failed");
                Err(AuthError::ReauthRequired(e.to_string()))
            }
        }
    }

    async fn store_token(&self, token: &IdentityToken) {
        *self.state.write().await = AuthState::Authenticated(token.clone());
        if let Some(profile) = &self.profile {
            if let Err(e) = profile.set_identity_token(token.as_str()) {
                tracing::warn!(error = %e, "Failed to persist identity token");
            }
        }
    }
}

/// [`TokenRefresher`] backed by an HTTP token endpoint.
///
/// Sends the previously cached token as the refresh basis and expects
/// a fresh identity token back.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    profile: Arc<ProfileStore>,
}

impl HttpTokenRefresher {
    pub fn new(token_url: String, profile: Arc<ProfileStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url,
            profile,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn reauthenticate(&self) -> Result<IdentityToken, AuthError> {
        let prior = self
            .profile
            .identity_token()
            .ok()
            .flatten()
            .ok_or(AuthError::SignedOut)?;

        let response = self
            .client
            .post(&self.token_url)
            .json(&serde_json::json!({ "identity_token": prior }))
            .send()
            .await
            .map_err(|e| AuthError::SignInFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::SignInFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            identity_token: String,
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::SignInFailed(e.to_string()))?;

        Ok(IdentityToken::new(body.identity_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Build a structurally valid token expiring `minutes_from_now`
    /// minutes from now.
    fn make_token(minutes_from_now: i64) -> IdentityToken {
        let exp = (Utc::now() + Duration::minutes(minutes_from_now)).timestamp();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user","exp":{exp}}}"#));
        IdentityToken::new(format!("{header}.{payload}.sig"))
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRefresher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn reauthenticate(&self) -> Result<IdentityToken, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Give concurrent callers time to pile up on the lock
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if self.fail {
                Err(AuthError::SignInFailed("provider rejected".into()))
            } else {
                Ok(make_token(120))
            }
        }
    }

    #[test]
    fn token_expiring_in_ten_minutes_is_expiring_soon() {
        assert!(make_token(10).is_expiring_soon());
    }

    #[test]
    fn token_expiring_in_two_hours_is_fresh() {
        assert!(!make_token(120).is_expiring_soon());
    }

    #[test]
    fn undecodable_token_is_always_expiring() {
        assert!(IdentityToken::new("not-a-token").is_expiring_soon());
        assert!(IdentityToken::new("a.b").is_expiring_soon());
        assert!(IdentityToken::new("a.%%%.c").is_expiring_soon());
        // Valid base64 but no exp claim
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user"}"#);
        assert!(IdentityToken::new(format!("h.{payload}.s")).is_expiring_soon());
    }

    #[test]
    fn expiration_reads_the_exp_claim() {
        let token = make_token(120);
        let expiry = token.expiration().unwrap();
        let delta = expiry - Utc::now();
        assert!(delta > Duration::minutes(119) && delta <= Duration::minutes(120));
    }

    #[tokio::test]
    async fn ensure_fresh_fails_when_signed_out() {
        let gate = AuthGate::new(CountingRefresher::new(false));
        assert!(matches!(
            gate.ensure_fresh().await,
            Err(AuthError::SignedOut)
        ));
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let refresher = CountingRefresher::new(false);
        let gate = AuthGate::new(refresher.clone());
        gate.adopt_token(make_token(120)).await;

        gate.ensure_fresh().await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_token_triggers_exactly_one_refresh_for_concurrent_callers() {
        let refresher = CountingRefresher::new(false);
        let gate = Arc::new(AuthGate::new(refresher.clone()));
        gate.adopt_token(make_token(10)).await;

        let (a, b) = tokio::join!(gate.ensure_fresh(), gate.ensure_fresh());
        a.unwrap();
        b.unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(gate.state().await, AuthState::Authenticated(_)));
    }

    #[tokio::test]
    async fn failed_refresh_signs_out_and_requires_reauth() {
        let gate = AuthGate::new(CountingRefresher::new(true));
        gate.adopt_token(make_token(10)).await;

        let err = gate.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, AuthError::ReauthRequired(_)));
        assert_eq!(gate.state().await, AuthState::SignedOut);
    }

    #[tokio::test]
    async fn sign_in_transitions_to_authenticated() {
        let gate = AuthGate::new(CountingRefresher::new(false));
        // sign_in refreshes through the collaborator even from SignedOut
        gate.adopt_token(make_token(120)).await;
        gate.sign_in().await.unwrap();
        assert!(matches!(gate.state().await, AuthState::Authenticated(_)));
    }
}
