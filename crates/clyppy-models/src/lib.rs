//! Shared data models for the Clyppy embed pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Clips and their content-addressed public identifiers
//! - Delivery strategies and resolver output
//! - Guild context and interaction records published to the backing API
//! - Pending tasks persisted across restarts
//! - Pipeline limits and the user-facing error table

pub mod clip;
pub mod delivery;
pub mod error;
pub mod guild;
pub mod interaction;
pub mod limits;
pub mod service;
pub mod task;
pub mod utils;

// Re-export common types
pub use clip::Clip;
pub use delivery::{DeliveryStrategy, DownloadResponse, MediaSource};
pub use error::EmbedErrorKind;
pub use guild::GuildContext;
pub use interaction::{ErrorReport, InteractionEdit, InteractionPublish};
pub use service::{ParseServiceError, Service};
pub use task::{ExtendModel, PendingTask, QuickembedTask, SlashCommandTask};
pub use utils::{encode_base36, short_hash};
