//! Bearer JWT authentication.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use super::{AuthError, AuthRequest, Authenticator, Identity};

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Authenticator that verifies HS256 bearer tokens.
///
/// The `sub` claim must be the caller's user UUID. Audience is not checked;
/// expiry is.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let token = request.bearer_token().ok_or(AuthError::NotAuthenticated)?;

        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            AuthError::InvalidCredentials("subject is not a user id".to_string())
        })?;

        Ok(Identity {
            user_id,
            method: "jwt".to_string(),
            claims: data.claims.extra,
        })
    }

    fn method_name(&self) -> &'static str {
        "jwt"
    }
}
