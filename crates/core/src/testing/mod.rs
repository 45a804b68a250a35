//! Testing utilities and mock implementations.
//!
//! Mocks for every outbound seam (provider, object store, broadcast) so the
//! orchestrator and the HTTP layer can be exercised without real services.
//!
//! # Example
//!
//! ```rust,ignore
//! use bracketeer_core::testing::{fixtures, MockBroadcaster, MockObjectStore, MockProvider};
//!
//! let provider = Arc::new(MockProvider::new());
//! let objects = Arc::new(MockObjectStore::new());
//! let broadcaster = Arc::new(MockBroadcaster::new());
//!
//! provider.fail_matching("upload_blob", "3.jpg", 500).await;
//!
//! let orchestrator = Orchestrator::new(
//!     fixtures::fast_config(),
//!     provider.clone(),
//!     objects.clone(),
//!     Arc::new(SqliteOrderStore::in_memory()?),
//!     broadcaster.clone(),
//! );
//! ```

mod mock_broadcaster;
mod mock_object_store;
mod mock_provider;

pub use mock_broadcaster::{MockBroadcaster, PublishedMessage};
pub use mock_object_store::{MockBlob, MockObjectStore};
pub use mock_provider::{MockProvider, ProviderCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use crate::orchestrator::{OrchestratorConfig, UploadFile};
    use crate::order::Bracket;

    /// Orchestrator config with millisecond retry and verify delays.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry_attempts: 3,
            retry_base_delay_ms: 1,
            verify_attempts: 2,
            verify_interval_ms: 1,
            ..Default::default()
        }
    }

    /// A small fake JPEG (SOI marker and padding).
    pub fn jpeg_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len.max(4), 0x42);
        bytes
    }

    pub fn upload_file(filename: &str) -> UploadFile {
        UploadFile {
            filename: filename.to_string(),
            bytes: jpeg_bytes(64),
        }
    }

    /// Uploaded files named `1.jpg` through `<n>.jpg`.
    pub fn numbered_files(n: usize) -> Vec<UploadFile> {
        (1..=n).map(|i| upload_file(&format!("{}.jpg", i))).collect()
    }

    /// An uploaded bracket with an optional upload group.
    pub fn bracket(order_id: Uuid, bracket_id: &str, group_id: Option<&str>) -> Bracket {
        let metadata = match group_id {
            Some(group) => json!({ "group_id": group }),
            None => json!({}),
        };
        Bracket {
            id: Uuid::new_v4(),
            order_id,
            bracket_id: bracket_id.to_string(),
            image_id: None,
            filename: format!("{}.jpg", bracket_id),
            upload_url: None,
            is_uploaded: true,
            metadata,
            created_at: Utc::now(),
        }
    }
}
