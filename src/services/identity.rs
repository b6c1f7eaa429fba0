//! Bearer token verification.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the user id. The id is only
//! used to record who created a job.

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Token subject is empty")]
    MissingSubject,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Clone)]
pub struct IdentityService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl IdentityService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Verifies the token and returns the user id it was issued for.
    pub fn verify(&self, token: &str) -> Result<String, IdentityError> {
        let validation = Validation::new(Algorithm::HS256);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::Expired,
                _ => {
                    tracing::debug!(error = %e, "Rejected bearer token");
                    IdentityError::Invalid
                }
            })?;

        if claims.sub.trim().is_empty() {
            return Err(IdentityError::MissingSubject);
        }
        Ok(claims.sub)
    }

    /// Issues a token for `user_id`, valid for `ttl_secs`.
    pub fn issue(&self, user_id: &str, ttl_secs: u64) -> Result<String, IdentityError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl_secs;
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| IdentityError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_verifies() {
        let identity = IdentityService::new("test-secret");
        let token = identity.issue("user-42", 3600).unwrap();
        assert_eq!(identity.verify(&token).unwrap(), "user-42");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = IdentityService::new("one").issue("user-42", 3600).unwrap();
        let result = IdentityService::new("two").verify(&token);
        assert!(matches!(result, Err(IdentityError::Invalid)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let identity = IdentityService::new("test-secret");
        let claims = Claims {
            sub: "user-42".to_string(),
            exp: 1_000_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(identity.verify(&token), Err(IdentityError::Expired)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let identity = IdentityService::new("test-secret");
        assert!(matches!(identity.verify("not-a-jwt"), Err(IdentityError::Invalid)));
    }
}
