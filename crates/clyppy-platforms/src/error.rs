//! Platform crate error types.

use thiserror::Error;

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not resolve share link: {url}")]
    ShareLinkUnresolved { url: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl PlatformError {
    pub fn share_link_unresolved(url: impl Into<String>) -> Self {
        Self::ShareLinkUnresolved { url: url.into() }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl(url.into())
    }
}
