//! S3-compatible object storage behind the public CDN.
//!
//! Reuploaded videos land under `temp/`, thumbnails under `img/`; both
//! are world-readable and served from the fixed CDN base.

pub mod client;
pub mod error;

pub use client::{thumbnail_key, video_key, CdnClient, CdnConfig};
pub use error::{StorageError, StorageResult};
