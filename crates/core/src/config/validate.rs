use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Provider, storage and broadcast endpoints and credentials are present
/// - JWT auth has a secret
/// - Orchestrator grouping size is positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::Jwt
        && config.auth.jwt_secret.as_ref().is_none_or(|s| s.is_empty())
    {
        return Err(invalid("auth.jwt_secret must be set when auth.method = \"jwt\""));
    }

    require(&config.provider.base_url, "provider.base_url")?;
    require(&config.provider.api_key, "provider.api_key")?;
    require(&config.provider.webhook_token, "provider.webhook_token")?;

    require(&config.storage.url, "storage.url")?;
    require(&config.storage.bucket, "storage.bucket")?;
    if config.storage.active_key().is_empty() {
        return Err(invalid(
            "storage key for the selected storage.credential is empty",
        ));
    }

    require(&config.broadcast.url, "broadcast.url")?;
    require(&config.broadcast.api_key, "broadcast.api_key")?;

    if config.orchestrator.brackets_per_image == 0 {
        return Err(invalid("orchestrator.brackets_per_image cannot be 0"));
    }
    if config.orchestrator.retry_attempts == 0 {
        return Err(invalid("orchestrator.retry_attempts cannot be 0"));
    }

    Ok(())
}

fn require(value: &str, name: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(&format!("{} cannot be empty", name)));
    }
    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}
