//! Embed pipeline orchestration.
//!
//! This crate wires the shared pieces (platform registry, media tools, CDN,
//! backing API, pending-task store) into the request pipeline:
//!
//! 1. Recognize URLs in messages / accept `/embed` interactions
//! 2. Probe metadata and run the token gate
//! 3. Pick the cheapest viable delivery path (redirect, attach, reupload)
//! 4. Publish the interaction row and reply in channel
//!
//! The chat gateway itself stays behind the [`Gateway`] trait; the hosting
//! binary adapts its client library to it and feeds [`MessageEvent`]s and
//! [`EmbedCommand`]s into an [`Embedder`].

pub mod config;
pub mod downloads;
pub mod error;
pub mod extension;
pub mod gate;
pub mod gateway;
pub mod orchestrator;
pub mod replay;
pub mod selector;
pub mod settings;
pub mod shutdown;
pub mod state;
pub mod webhook;

pub use config::EmbedderConfig;
pub use downloads::DownloadManager;
pub use error::{EmbedError, EmbedResult};
pub use gateway::{ButtonLink, ChannelPermissions, Gateway, Reply};
pub use orchestrator::{EmbedCommand, EmbedContext, Embedder, MessageEvent, ReplyTarget};
pub use replay::replay_pending;
pub use settings::{AllEnabled, GuildSettings};
pub use shutdown::{shutdown_channel, ShutdownController, ShutdownFlag};
pub use state::InflightSets;
pub use webhook::WebhookEditor;
