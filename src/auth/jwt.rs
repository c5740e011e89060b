use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// user email
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// HS256 access tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl JwtService {
    /// An empty `secret` gets a random per-process key, so tokens die with the process.
    pub fn new(secret: &str, lifetime_minutes: i64) -> Self {
        let secret = if secret.trim().is_empty() {
            tracing::warn!("auth.secret_key is not set; using a random key for this process");
            hex::encode(rand::random::<[u8; 32]>())
        } else {
            secret.to_string()
        };

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::minutes(lifetime_minutes.max(1)),
        }
    }

    pub fn create_token(&self, email: &str) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: email.to_string(),
            exp: (now + self.lifetime).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(ApiError::internal)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token verification failed: {}", e);
                ApiError::unauthorized("Invalid authentication credentials")
            })
    }
}
