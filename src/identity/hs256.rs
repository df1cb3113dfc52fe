use crate::errors::MessagingError;
use crate::identity::{Identity, TokenService};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    username: String,
    iat: u64,
    exp: u64,
}

/// HS256 implementation of the Token Service, sharing a secret with the
/// issuing side.
pub struct Hs256TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl Hs256TokenService {
    pub fn new(secret: &str, ttl_secs: u64) -> Result<Self, MessagingError> {
        if secret.is_empty() {
            return Err(MessagingError::Config(
                "auth.tokenSecret is not configured".to_string(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        })
    }
}

#[async_trait]
impl TokenService for Hs256TokenService {
    async fn issue(&self, identity: &Identity) -> Result<String, MessagingError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            id: identity.user_id.clone(),
            username: identity.username.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| MessagingError::Verification(e.to_string()))
    }

    async fn verify(&self, token: &str) -> Result<Identity, MessagingError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| MessagingError::Verification(e.to_string()))?;
        Ok(Identity {
            user_id: data.claims.id,
            username: data.claims.username,
        })
    }
}
