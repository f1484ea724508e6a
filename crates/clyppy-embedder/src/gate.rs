//! Admission and the token ledger.
//!
//! Pricing is pure; the ledger calls live next to it so the charge/refund
//! pairing is all in one place. A charge is recorded in [`ChargeState`]
//! before the pipeline continues, and the failure path refunds whatever the
//! state still holds, including when the pipeline future itself was
//! cancelled by the slash-command race.

use std::sync::Mutex;

use tracing::{info, warn};

use clyppy_api::ApiClient;
use clyppy_models::limits::EXTEND_REFUND_TOKENS;
use clyppy_models::EmbedErrorKind;

use crate::config::EmbedderConfig;
use crate::error::{EmbedError, EmbedResult};

/// Ledger reason attached to embed charges.
const EMBED_CHARGE_REASON: &str = "Video Embed";
/// Ledger reason attached to AI-extension charges.
const EXTEND_CHARGE_REASON: &str = "AI Video Extension";
/// Ledger reason attached to compensating refunds.
pub const REFUND_REASON: &str = "Token Refund";

/// Gate decision for one probed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Free,
    Charge(u32),
    /// At or past the hard cap; rejected everywhere, dl-server included.
    TooLong,
}

/// Decide admission from the probed duration.
///
/// Order matters: the hard cap rejects before the dl-server exemption can
/// admit, and the exemption only waives the charge, never the cap.
pub fn admission_for(duration_secs: u32, in_dl_server: bool, cfg: &EmbedderConfig) -> Admission {
    if duration_secs <= cfg.free_max_secs {
        return Admission::Free;
    }
    if duration_secs >= cfg.hard_max_secs {
        return Admission::TooLong;
    }
    if in_dl_server {
        return Admission::Free;
    }
    let window = cfg.per_token_window_secs.max(1);
    let windows = (duration_secs - cfg.free_max_secs).div_ceil(window);
    Admission::Charge(windows * cfg.token_cost)
}

/// Tokens taken for one request.
///
/// Shared (via `Arc`) between the pipeline future and the failure handler so
/// the refund sees charges even when the future was dropped mid-await.
/// Accumulates: a duration charge and an extension charge on the same
/// request refund together.
#[derive(Debug, Default)]
pub struct ChargeState(Mutex<Option<ChargeRecord>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeRecord {
    pub user_id: u64,
    pub tokens: u32,
}

impl ChargeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: u64, tokens: u32) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_mut() {
            Some(existing) => existing.tokens += tokens,
            None => *slot = Some(ChargeRecord { user_id, tokens }),
        }
    }

    /// Take the record out, leaving the state empty. The caller owns the
    /// refund from here.
    pub fn take(&self) -> Option<ChargeRecord> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn charged(&self) -> u32 {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|r| r.tokens)
            .unwrap_or(0)
    }
}

/// Charge an embed's duration cost.
pub async fn charge_embed(
    api: &ApiClient,
    user_id: u64,
    cost: u32,
    charge: &ChargeState,
) -> EmbedResult<()> {
    charge_tokens(api, user_id, cost, EMBED_CHARGE_REASON, charge).await
}

/// Charge the flat AI-extension fee.
pub async fn charge_extension(
    api: &ApiClient,
    user_id: u64,
    charge: &ChargeState,
) -> EmbedResult<()> {
    charge_tokens(api, user_id, EXTEND_REFUND_TOKENS, EXTEND_CHARGE_REASON, charge).await
}

/// Subtract `cost` tokens, admitting only when the ledger confirms both the
/// call and the balance. Never retried: a duplicate charge is worse than a
/// spurious rejection.
async fn charge_tokens(
    api: &ApiClient,
    user_id: u64,
    cost: u32,
    reason: &str,
    charge: &ChargeState,
) -> EmbedResult<()> {
    if cost == 0 {
        return Ok(());
    }

    let response = api.subtract_tokens(user_id, cost as i64, reason).await?;
    if !response.success || !response.user_success {
        info!(user_id, cost, balance = ?response.tokens, "token charge refused");
        return Err(EmbedError::terminal(
            EmbedErrorKind::VideoTooLong,
            format!("gate refused a {cost}-token charge"),
        ));
    }

    charge.record(user_id, cost);
    info!(user_id, cost, remaining = ?response.tokens, "tokens charged");
    Ok(())
}

/// Compensating add for a failed request, posted as a negative subtract.
/// Best-effort: a refund that cannot be posted is logged, not raised.
pub async fn refund_tokens(api: &ApiClient, record: ChargeRecord) {
    match api
        .subtract_tokens(record.user_id, -(record.tokens as i64), REFUND_REASON)
        .await
    {
        Ok(response) if response.success => {
            info!(user_id = record.user_id, tokens = record.tokens, "tokens refunded");
        }
        Ok(_) => {
            warn!(user_id = record.user_id, tokens = record.tokens, "refund not applied");
        }
        Err(e) => {
            warn!(
                user_id = record.user_id,
                tokens = record.tokens,
                error = %e,
                "refund failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg() -> EmbedderConfig {
        EmbedderConfig::default()
    }

    #[test]
    fn test_free_tier_boundary() {
        assert_eq!(admission_for(0, false, &cfg()), Admission::Free);
        assert_eq!(admission_for(300, false, &cfg()), Admission::Free);
        assert_eq!(admission_for(301, false, &cfg()), Admission::Charge(1));
    }

    #[test]
    fn test_one_token_covers_a_full_window() {
        // 300 free + 1800 paid = 2100s on one token; one second more
        // starts the next window.
        assert_eq!(admission_for(1799, false, &cfg()), Admission::Charge(1));
        let mut wide = cfg();
        wide.hard_max_secs = 7200;
        assert_eq!(admission_for(2100, false, &wide), Admission::Charge(1));
        assert_eq!(admission_for(2101, false, &wide), Admission::Charge(2));
    }

    #[test]
    fn test_hard_cap_rejects() {
        assert_eq!(admission_for(1800, false, &cfg()), Admission::TooLong);
        assert_eq!(admission_for(90_000, false, &cfg()), Admission::TooLong);
    }

    #[test]
    fn test_dl_server_waives_the_charge_not_the_cap() {
        assert_eq!(admission_for(900, true, &cfg()), Admission::Free);
        assert_eq!(admission_for(1800, true, &cfg()), Admission::TooLong);
    }

    #[test]
    fn test_charge_state_accumulates_and_empties() {
        let state = ChargeState::new();
        assert_eq!(state.charged(), 0);
        state.record(9, 1);
        state.record(9, 10);
        assert_eq!(state.charged(), 11);

        let record = state.take().unwrap();
        assert_eq!(record.user_id, 9);
        assert_eq!(record.tokens, 11);
        assert!(state.take().is_none());
    }

    #[tokio::test]
    async fn test_successful_charge_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/subtract/"))
            .and(body_partial_json(json!({"user_id": 5, "amount": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "user_success": true, "tokens": 7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), "key").unwrap();
        let state = ChargeState::new();
        charge_embed(&api, 5, 2, &state).await.unwrap();
        assert_eq!(state.charged(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects_without_recording() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/subtract/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "user_success": false, "tokens": 0
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), "key").unwrap();
        let state = ChargeState::new();
        let err = charge_embed(&api, 5, 2, &state).await.unwrap_err();
        assert_eq!(err.kind(), EmbedErrorKind::VideoTooLong);
        assert_eq!(state.charged(), 0);
    }

    #[tokio::test]
    async fn test_zero_cost_never_touches_the_ledger() {
        // No mock mounted: any request would error out.
        let api = ApiClient::new("http://127.0.0.1:9", "key").unwrap();
        let state = ChargeState::new();
        charge_embed(&api, 5, 0, &state).await.unwrap();
        assert_eq!(state.charged(), 0);
    }

    #[tokio::test]
    async fn test_refund_posts_a_negative_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/subtract/"))
            .and(body_partial_json(json!({
                "user_id": 5, "amount": -3, "reason": "Token Refund"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "user_success": true, "tokens": 10
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), "key").unwrap();
        refund_tokens(&api, ChargeRecord { user_id: 5, tokens: 3 }).await;
    }
}
