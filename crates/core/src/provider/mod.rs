//! Enhancement provider abstraction.
//!
//! This module provides an `EnhancementProvider` trait for the external AI
//! service that merges bracketed exposures, plus the HTTP implementation and
//! the retry primitive shared by all provider-facing call sites.

mod http;
mod presigned;
mod retry;
pub mod timestamps;
mod types;

pub use http::HttpProvider;
pub use presigned::presigned_upload_headers;
pub use retry::{retry, RetryPolicy, Transient};
pub use types::*;
