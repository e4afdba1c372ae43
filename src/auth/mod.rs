//! Platform authentication: credential persistence, token lifecycle and the
//! authenticated request gateway.
//!
//! Split into submodules:
//! - `store` - durable refresh-token persistence
//! - `tokens` - authorization-code exchange and refresh protocol
//! - `gateway` - bearer-authenticated data calls with bounded 401 retry
//! - `transport` - thin HTTP seam so the above are testable offline

pub mod gateway;
pub mod store;
pub mod tokens;
pub mod transport;

#[cfg(test)]
mod tests;

pub use gateway::{ApiGateway, AuthorizationPrompt, StdinPrompt};
pub use store::CredentialStore;
pub use tokens::{RefreshOutcome, TokenClient, TokenPair};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport};

use thiserror::Error;

/// Errors from the token lifecycle and the request gateway.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint answered 2xx but the body lacked a token.
    #[error("token exchange response missing {0}")]
    ExchangeIncomplete(&'static str),
    /// Any non-2xx platform response that is not an expected-failure path.
    #[error("platform returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },
    /// A data call came back 401 twice in a row; the retry ceiling is final.
    #[error("still unauthorized after token refresh and retry")]
    Unauthorized,
    #[error("interactive authorization failed: {0}")]
    Prompt(String),
    #[error("credential store I/O failed: {0}")]
    Store(#[source] std::io::Error),
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
    #[error("failed to parse platform response body: {0}")]
    BadBody(#[source] serde_json::Error),
}
