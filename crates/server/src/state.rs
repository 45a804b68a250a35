use std::sync::Arc;

use bracketeer_core::{
    Authenticator, Config, Orchestrator, OrderStore, SanitizedConfig, WebhookVerifier,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    webhook_verifier: WebhookVerifier,
    orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        orchestrator: Orchestrator,
    ) -> Self {
        let webhook_verifier = WebhookVerifier::new(config.provider.webhook_token.clone());
        Self {
            config,
            authenticator,
            webhook_verifier,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn webhook_verifier(&self) -> &WebhookVerifier {
        &self.webhook_verifier
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        self.orchestrator.store()
    }
}
