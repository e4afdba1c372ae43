//! Authenticated request gateway.
//!
//! One logical data call against the platform: obtain a valid access token
//! (refreshing proactively to absorb clock skew and token-lifetime variance),
//! issue the GET, and retry exactly once on 401. The retry ceiling is an
//! explicit constant rather than recursion so the "at most two data requests
//! per call" property is visible and testable.

use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::tokens::{RefreshOutcome, TokenClient, TokenPair};
use super::transport::HttpTransport;
use super::AuthError;
use crate::config::PlatformConfig;

/// Initial request plus one retry after a reactive refresh.
const MAX_DATA_ATTEMPTS: usize = 2;

/// Seam for the interactive authorization flow: present the URL, block for
/// the one-time code captured out-of-band.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn obtain_code(&self, authorization_url: &str) -> Result<String, AuthError>;
}

/// Console prompt used when the service runs attended.
pub struct StdinPrompt;

#[async_trait]
impl AuthorizationPrompt for StdinPrompt {
    async fn obtain_code(&self, authorization_url: &str) -> Result<String, AuthError> {
        let url = authorization_url.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            writeln!(stdout, "Visit this URL to authenticate: {url}")
                .and_then(|_| write!(stdout, "Enter the authorization code: "))
                .and_then(|_| stdout.flush())
                .map_err(|e| AuthError::Prompt(e.to_string()))?;
            let mut code = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut code)
                .map_err(|e| AuthError::Prompt(e.to_string()))?;
            let code = code.trim().to_string();
            if code.is_empty() {
                return Err(AuthError::Prompt("empty authorization code".to_string()));
            }
            Ok(code)
        })
        .await
        .map_err(|e| AuthError::Prompt(e.to_string()))?
    }
}

pub struct ApiGateway {
    config: Arc<PlatformConfig>,
    tokens: TokenClient,
    transport: Arc<dyn HttpTransport>,
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl ApiGateway {
    pub fn new(
        config: Arc<PlatformConfig>,
        tokens: TokenClient,
        transport: Arc<dyn HttpTransport>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Self {
        Self {
            config,
            tokens,
            transport,
            prompt,
        }
    }

    pub fn tokens(&self) -> &TokenClient {
        &self.tokens
    }

    /// Issue one logical GET against `{base}/{endpoint}` and return the
    /// parsed JSON body unfiltered. Schema validation is the caller's job.
    pub async fn call(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<Value, AuthError> {
        let mut pair = self.ensure_access_token().await?;
        let url = self.config.endpoint_url(endpoint);

        for attempt in 1..=MAX_DATA_ATTEMPTS {
            let reply = self
                .transport
                .get(&url, &pair.access_token, params)
                .await?;

            if reply.is_success() {
                return serde_json::from_str(&reply.body).map_err(AuthError::BadBody);
            }

            if reply.status == 401 {
                if attempt == MAX_DATA_ATTEMPTS {
                    log::error!("{endpoint}: unauthorized again after refresh, giving up");
                    return Err(AuthError::Unauthorized);
                }
                log::warn!("{endpoint}: access token rejected, refreshing and retrying once");
                pair = self.refresh_or_reauthorize(&pair.refresh_token).await?;
                continue;
            }

            return Err(AuthError::Remote {
                status: reply.status,
                body: reply.body,
            });
        }
        unreachable!("data attempt loop always returns")
    }

    /// Obtain a currently-valid token pair: load the stored refresh token
    /// (interactive flow when absent), then refresh proactively so the
    /// access token is fresh for this call.
    async fn ensure_access_token(&self) -> Result<TokenPair, AuthError> {
        let refresh_token = match self.tokens.load_credential()? {
            Some(token) => token,
            None => {
                log::info!("no stored credential; starting interactive authorization");
                return self.interactive_authorize().await;
            }
        };

        self.refresh_or_reauthorize(&refresh_token).await
    }

    /// Refresh, falling back to the interactive flow when the platform
    /// reports the refresh token dead.
    async fn refresh_or_reauthorize(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        match self.tokens.refresh(refresh_token).await? {
            RefreshOutcome::Rotated(pair) => Ok(pair),
            RefreshOutcome::Invalid => self.interactive_authorize().await,
        }
    }

    async fn interactive_authorize(&self) -> Result<TokenPair, AuthError> {
        let auth_url = self.tokens.authorization_url();
        let code = self.prompt.obtain_code(&auth_url).await?;
        self.tokens.exchange_authorization_code(&code).await
    }
}
