//! Order lifecycle orchestration.
//!
//! The orchestrator drives an order through its state machine across the
//! provider, object store, order store and broadcast channel:
//! - **Upload**: per-file bracket creation, PUT, verification (sequential)
//! - **Process**: bracket grouping and dispatch
//! - **Webhook**: completion and failure paths (background tasks)
//! - **Reconcile**: opportunistic provider refresh and forced verification

mod config;
mod download;
mod grouping;
mod process;
mod service;
mod types;
mod upload;
mod webhook;

pub use config::OrchestratorConfig;
pub use download::download_options;
pub use grouping::{group_brackets, BracketGrouping, GroupingStrategy};
pub use process::build_process_request;
pub use service::Orchestrator;
pub use types::*;
pub use upload::{assign_groups, mime_for_filename};
pub use webhook::{enhanced_filename, IMAGE_FAILED_MESSAGE};
