use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::shared::AppError;

/// Claims carried by a connection token. Token issuance lives in the
/// identity service; this server only validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub user_id: String,
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
}

impl TokenConfig {
    pub fn new() -> Self {
        Self {
            secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string()),
        }
    }

    /// Validates a JWT token and returns the claims if valid
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<AuthClaims, AppError> {
        decode::<AuthClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| {
            debug!(
                user_id = %data.claims.user_id,
                name = %data.claims.name,
                "JWT token decoded successfully"
            );
            data.claims
        })
        .map_err(|e| {
            debug!(error = %e, "Failed to decode JWT token");
            AppError::JwtError(e.to_string())
        })
    }

    /// Creates a connection token for the given identity. Used by tests and
    /// local development; production tokens come from the identity service.
    #[instrument(skip(self))]
    pub fn create_token(&self, user_id: String, name: String) -> Result<String, AppError> {
        let now = chrono::Utc::now();
        let claims = AuthClaims {
            user_id,
            name,
            exp: (now + chrono::Duration::days(1)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| AppError::JwtError(e.to_string()))
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate_token() {
        let config = TokenConfig::new();

        let token = config
            .create_token("user-1".to_string(), "alice".to_string())
            .unwrap();
        assert!(!token.is_empty());

        let claims = config.validate_token(&token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.name, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_invalid_token() {
        let config = TokenConfig::new();
        let result = config.validate_token("invalid.token.here");
        assert!(matches!(result, Err(AppError::JwtError(_))));
    }
}
