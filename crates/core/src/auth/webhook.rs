//! Shared-secret verification for provider callbacks.

use super::{bearer_token, AuthError};

/// Verifies the bearer token the provider attaches to webhook calls.
#[derive(Clone)]
pub struct WebhookVerifier {
    expected_token: String,
}

impl WebhookVerifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            expected_token: token.into(),
        }
    }

    /// Check the raw `Authorization` header value.
    pub fn verify(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        let provided = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::NotAuthenticated)?;

        // Constant-time comparison to prevent timing attacks
        if constant_time_eq(provided.as_bytes(), self.expected_token.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials(
                "Invalid webhook token".to_string(),
            ))
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
