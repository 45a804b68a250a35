mod jwt;
mod none;
mod traits;
mod types;
mod webhook;

pub use jwt::*;
pub use none::*;
pub use traits::*;
pub use types::*;
pub use webhook::*;

use crate::config::AuthConfig;

/// Factory function to create authenticator from config
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    use crate::config::AuthMethod;

    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new())),
        AuthMethod::Jwt => {
            let secret = config
                .jwt_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AuthError::ConfigurationError(
                        "jwt_secret must be set when using Jwt auth method".to_string(),
                    )
                })?;
            Ok(Box::new(JwtAuthenticator::new(secret)))
        }
    }
}
