//! Object storage for order artifacts.
//!
//! Blobs live under `users/<user_id>/orders/<order_id>/<filename>`. Uploads
//! overwrite in place, so the public URL of a path never changes.

mod http;
mod traits;

pub use http::HttpObjectStore;
pub use traits::{object_path, order_prefix, ObjectStore, StorageError, StoredObject};
