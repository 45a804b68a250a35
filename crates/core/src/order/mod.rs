//! Order persistence.
//!
//! Orders, the local shadow of their provider brackets, and the blobs stored
//! for them. Deleting an order cascades to both child tables.

mod migrations;
mod sqlite_store;
mod store;
mod types;

pub use migrations::{run_migrations, Migration, MIGRATIONS};
pub use sqlite_store::SqliteOrderStore;
pub use store::{OrderStore, StoreError};
pub use types::*;
