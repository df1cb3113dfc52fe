pub mod hs256;

pub use hs256::Hs256TokenService;

use crate::errors::MessagingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The authenticated caller, as embedded in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Seam to the Token Service collaborator.
///
/// The core never inspects token internals itself; it issues and verifies
/// through this trait so the signing scheme stays swappable.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// Mint a signed session token for `identity`. Tokens expire after the
    /// service's configured lifetime (one hour by default).
    async fn issue(&self, identity: &Identity) -> Result<String, MessagingError>;

    /// Check signature and expiry, returning the embedded identity.
    async fn verify(&self, token: &str) -> Result<Identity, MessagingError>;
}

/// Resolve the current user from a locally stored token.
///
/// An absent token short-circuits to `Unauthenticated` without touching the
/// Token Service. A failing verification is logged and collapsed into the
/// same `Unauthenticated` answer; callers only learn that no session
/// exists, not why.
pub async fn resolve_identity(
    verifier: &dyn TokenService,
    token: Option<&str>,
) -> Result<Identity, MessagingError> {
    let Some(token) = token else {
        return Err(MessagingError::Unauthenticated);
    };
    match verifier.verify(token).await {
        Ok(identity) => Ok(identity),
        Err(err) => {
            tracing::debug!("token verification failed: {}", err);
            Err(MessagingError::Unauthenticated)
        }
    }
}
