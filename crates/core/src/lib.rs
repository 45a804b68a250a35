pub mod auth;
pub mod broadcast;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod order;
pub mod provider;
pub mod storage;
pub mod testing;

pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
    WebhookVerifier,
};
pub use broadcast::{announce, BroadcastError, Broadcaster, HttpBroadcaster, OrderEvent};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    Environment, SanitizedConfig,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use order::{Order, OrderStatus, OrderStore, SqliteOrderStore, StoreError};
pub use provider::{EnhancementProvider, HttpProvider, ProviderError};
pub use storage::{HttpObjectStore, ObjectStore, StorageError};
