//! Guild context attached to every pipeline request.

use serde::{Deserialize, Serialize};

/// Where a triggering message or interaction came from.
///
/// Most permission checks are skipped in DMs, and the dl-server short-circuit
/// keys off the guild id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildContext {
    /// Guild id; 0 in DMs.
    pub id: u64,
    /// Guild name as reported by the gateway.
    pub name: String,
    /// True for private conversations.
    pub is_dm: bool,
}

impl GuildContext {
    pub fn guild(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_dm: false,
        }
    }

    pub fn dm() -> Self {
        Self {
            id: 0,
            name: "DM".to_string(),
            is_dm: true,
        }
    }

    /// Guild id for API payloads; DMs publish no guild.
    pub fn api_id(&self) -> Option<u64> {
        if self.is_dm {
            None
        } else {
            Some(self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dm_context() {
        let dm = GuildContext::dm();
        assert!(dm.is_dm);
        assert_eq!(dm.api_id(), None);
    }

    #[test]
    fn test_guild_context() {
        let g = GuildContext::guild(123456789, "Clip Lounge");
        assert!(!g.is_dm);
        assert_eq!(g.api_id(), Some(123456789));
    }
}
