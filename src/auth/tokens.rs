//! Authorization-code exchange and refresh-token rotation.
//!
//! The platform may rotate the refresh token on every renewal, so the store
//! is updated immediately after each successful exchange or refresh and the
//! old token is never used again. An expired or revoked refresh token is a
//! normal control-flow outcome (`RefreshOutcome::Invalid`), not an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::store::CredentialStore;
use super::transport::HttpTransport;
use super::AuthError;
use crate::config::PlatformConfig;

/// An access/refresh pair as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
}

/// Result of a refresh attempt.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// New pair obtained; the rotated refresh token is already persisted.
    Rotated(TokenPair),
    /// The platform reported `invalid_grant`: the refresh token is dead and
    /// the caller must fall back to interactive authorization. The persisted
    /// credential is left untouched.
    Invalid,
}

pub struct TokenClient {
    config: Arc<PlatformConfig>,
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
}

impl TokenClient {
    pub fn new(
        config: Arc<PlatformConfig>,
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
    ) -> Self {
        Self {
            config,
            transport,
            store,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// The URL a human visits to grant access. Pure function of the client
    /// identity and requested scope.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}",
            self.config.authorize_url(),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.oauth_scope),
        )
    }

    /// Load the persisted refresh token; `None` means interactive
    /// authorization is required.
    pub fn load_credential(&self) -> Result<Option<String>, AuthError> {
        self.store.load()
    }

    /// Exchange a one-time authorization code for a token pair, persisting
    /// the refresh token.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenPair, AuthError> {
        let reply = self
            .transport
            .post_form(
                &self.config.token_url(),
                &[
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", self.config.redirect_uri.as_str()),
                ],
            )
            .await?;

        if !reply.is_success() {
            return Err(AuthError::Remote {
                status: reply.status,
                body: reply.body,
            });
        }

        let pair = parse_token_pair(&reply.body)?;
        self.store.save(&pair.refresh_token)?;
        log::info!("authorization code exchanged; refresh token persisted");
        Ok(pair)
    }

    /// Trade a refresh token for a fresh pair. On success the rotated
    /// refresh token replaces the stored one before this returns.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, AuthError> {
        let reply = self
            .transport
            .post_form(
                &self.config.token_url(),
                &[
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        if reply.status == 400 && body_reports_invalid_grant(&reply.body) {
            log::warn!("refresh token invalid or expired; re-authentication required");
            return Ok(RefreshOutcome::Invalid);
        }
        if !reply.is_success() {
            return Err(AuthError::Remote {
                status: reply.status,
                body: reply.body,
            });
        }

        let pair = parse_token_pair(&reply.body)?;
        self.store.save(&pair.refresh_token)?;
        Ok(RefreshOutcome::Rotated(pair))
    }
}

fn parse_token_pair(body: &str) -> Result<TokenPair, AuthError> {
    let json: Value = serde_json::from_str(body).map_err(AuthError::BadBody)?;
    let access_token = json
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or(AuthError::ExchangeIncomplete("access_token"))?;
    let refresh_token = json
        .get("refresh_token")
        .and_then(Value::as_str)
        .ok_or(AuthError::ExchangeIncomplete("refresh_token"))?;
    Ok(TokenPair {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        issued_at: Utc::now(),
    })
}

fn body_reports_invalid_grant(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
        .map(|code| code.contains("invalid_grant"))
        .unwrap_or(false)
}
