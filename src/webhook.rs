// src/webhook.rs
//
// Provider notifications arrive at least once and in any order. A credit is
// applied only together with the insert of its event id.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::stripe::verify_signature;
use crate::error::{LedgerError, Result};
use crate::store::LedgerStore;

pub const TOP_UP_PURPOSE: &str = "top_up";

// Only checkout-session events carry the top-up metadata; crediting on the
// underlying payment intent too would pay the same top-up twice.
const SUCCEEDED_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

const FAILED_EVENTS: &[&str] = &[
    "checkout.session.async_payment_failed",
    "payment_intent.payment_failed",
];

#[derive(Debug, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUp {
    pub user_id: Uuid,
    pub amount: i64,
}

impl ProviderEvent {
    fn metadata(&self, key: &str) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }

    fn amount(&self) -> Option<i64> {
        let object = &self.data.object;
        object
            .get("amount_total")
            .or_else(|| object.get("amount"))
            .and_then(Value::as_i64)
    }

    /// The credit this event asks for, or why it does not apply.
    pub fn top_up(&self) -> std::result::Result<TopUp, String> {
        match self.metadata("purpose") {
            Some(TOP_UP_PURPOSE) => {}
            Some(other) => return Err(format!("purpose {other:?} is not a top-up")),
            None => return Err("metadata.purpose missing".to_string()),
        }
        let user_id = self
            .metadata("user_id")
            .ok_or_else(|| "metadata.user_id missing".to_string())?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| format!("metadata.user_id {user_id:?} is not a uuid"))?;
        if let Some(status) = self.data.object.get("payment_status").and_then(Value::as_str) {
            if status != "paid" {
                return Err(format!("payment_status {status:?} is not paid"));
            }
        }
        let amount = self.amount().ok_or_else(|| "amount missing".to_string())?;
        if amount <= 0 {
            return Err(format!("non-positive amount {amount}"));
        }
        Ok(TopUp { user_id, amount })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited {
        user_id: Uuid,
        amount: i64,
        balance: i64,
    },
    /// Event id seen before; nothing reapplied.
    Duplicate,
    /// Failed payment, kept for observability.
    Recorded,
    NotApplicable(String),
    Ignored(String),
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Credited { .. } => "credited",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Recorded => "recorded",
            WebhookOutcome::NotApplicable(_) => "not_applicable",
            WebhookOutcome::Ignored(_) => "ignored",
        }
    }
}

pub struct WebhookProcessor {
    store: Arc<dyn LedgerStore>,
    secret: String,
    tolerance: Duration,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn LedgerStore>, secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            store,
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verifies, deduplicates and applies one notification. `Err` means the
    /// provider should redeliver, except for `Authenticity`.
    pub async fn handle_event(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let header = signature_header
            .ok_or_else(|| LedgerError::Authenticity("missing signature header".to_string()))?;
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        verify_signature(
            raw_body,
            header,
            &self.secret,
            Utc::now().timestamp(),
            tolerance,
        )?;

        let event: ProviderEvent = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("webhook payload not understood: {}", e);
                return Ok(WebhookOutcome::NotApplicable(format!("malformed payload: {e}")));
            }
        };

        if SUCCEEDED_EVENTS.contains(&event.event_type.as_str()) {
            return self.apply_top_up(&event).await;
        }

        if FAILED_EVENTS.contains(&event.event_type.as_str()) {
            if !self.store.record_event(&event.id, &event.event_type).await? {
                return Ok(WebhookOutcome::Duplicate);
            }
            log::warn!(
                "payment failed event_id={} type={} user_id={}",
                event.id,
                event.event_type,
                event.metadata("user_id").unwrap_or("-")
            );
            return Ok(WebhookOutcome::Recorded);
        }

        log::debug!("webhook ignored event_id={} type={}", event.id, event.event_type);
        Ok(WebhookOutcome::Ignored(event.event_type))
    }

    async fn apply_top_up(&self, event: &ProviderEvent) -> Result<WebhookOutcome> {
        let top_up = match event.top_up() {
            Ok(top_up) => top_up,
            Err(reason) => {
                log::warn!("webhook not applicable event_id={} reason={}", event.id, reason);
                return Ok(WebhookOutcome::NotApplicable(reason));
            }
        };

        if self.store.user_profile(top_up.user_id).await?.is_none() {
            log::warn!(
                "webhook for unknown user event_id={} user_id={}",
                event.id,
                top_up.user_id
            );
            return Ok(WebhookOutcome::NotApplicable(format!(
                "unknown user {}",
                top_up.user_id
            )));
        }

        match self
            .store
            .credit_for_event(&event.id, &event.event_type, top_up.user_id, top_up.amount)
            .await?
        {
            Some(balance) => {
                log::info!(
                    "wallet credited event_id={} user_id={} amount={} balance={}",
                    event.id,
                    top_up.user_id,
                    top_up.amount,
                    balance
                );
                Ok(WebhookOutcome::Credited {
                    user_id: top_up.user_id,
                    amount: top_up.amount,
                    balance,
                })
            }
            None => {
                log::info!("webhook duplicate event_id={}", event.id);
                Ok(WebhookOutcome::Duplicate)
            }
        }
    }
}
