use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use uuid::Uuid;

/// Fixed user id used when authentication is disabled.
pub const DEVELOPMENT_USER_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_000000000001);

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// Token from an `Authorization: Bearer <token>` header (scheme is case-insensitive).
    pub fn bearer_token(&self) -> Option<&str> {
        bearer_token(self.headers.get("authorization")?)
    }
}

/// Strip the `Bearer ` scheme from an authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub method: String,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn development() -> Self {
        Self {
            user_id: DEVELOPMENT_USER_ID,
            method: "none".to_string(),
            claims: HashMap::new(),
        }
    }
}
