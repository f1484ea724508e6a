//! HTTP client for the clyppy.io backing API.
//!
//! Covers the endpoints the bot consumes: clip existence and metadata,
//! interaction publish (+edit, +error), the one-shot and chunked clip
//! upload, overwrite, and the token ledger.

pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use retry::{retry_async, RetryConfig};
pub use types::{
    AddClipResponse, ClipRecord, PublishResponse, StatusResponse, SubtractResponse, TokenBalance,
};
