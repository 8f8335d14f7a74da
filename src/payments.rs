// src/payments.rs
//
// Boundary to the external payment processor.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug)]
pub enum PaymentError {
    /// Transport failure or timeout: the provider may or may not have acted.
    Http(String),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl PaymentError {
    /// True when the provider definitely did not perform the operation.
    pub fn is_definite(&self) -> bool {
        match self {
            PaymentError::Api { status, .. } => {
                (400..500).contains(status) && *status != 409 && *status != 429
            }
            PaymentError::Http(_) | PaymentError::InvalidResponse(_) => false,
        }
    }
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentError::Http(e) => write!(f, "http error: {e}"),
            PaymentError::Api { status, body } => {
                write!(f, "payment api error status={status} body={body}")
            }
            PaymentError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl std::error::Error for PaymentError {}

impl From<reqwest::Error> for PaymentError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub id: String,
    pub amount: i64,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Hosted checkout page that tops up `user_id`'s wallet once paid.
    async fn create_top_up_session(
        &self,
        amount: i64,
        user_id: Uuid,
    ) -> Result<TopUpSession, PaymentError>;

    /// Sends `amount` to a connected account. The provider deduplicates on
    /// `idempotency_key`.
    async fn create_payout(
        &self,
        destination: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<Payout, PaymentError>;

    /// The provider's record of a payout issued with `idempotency_key`, if any.
    async fn find_payout(&self, idempotency_key: &str) -> Result<Option<Payout>, PaymentError>;
}

pub fn declaration_payout_key(declaration_id: Uuid) -> String {
    format!("declaration:{declaration_id}")
}

pub fn withdrawal_payout_key(withdrawal_id: Uuid) -> String {
    format!("withdrawal:{withdrawal_id}")
}

/// Error for a payout call whose effect at the provider is unknown.
pub(crate) fn unknown_outcome(e: PaymentError) -> LedgerError {
    LedgerError::ExternalService {
        message: format!("{e}; outcome will be reconciled before any retry"),
        retryable: true,
    }
}

pub(crate) fn timed_out(what: &str, timeout: Duration) -> LedgerError {
    LedgerError::ExternalService {
        message: format!(
            "{what} timed out after {timeout:?}; it will be reconciled before any retry"
        ),
        retryable: true,
    }
}

/// Asks the provider whether a payout with `key` already exists.
pub(crate) async fn lookup_payout(
    payments: &dyn PaymentProcessor,
    key: &str,
    timeout: Duration,
) -> Result<Option<Payout>, LedgerError> {
    match tokio::time::timeout(timeout, payments.find_payout(key)).await {
        Ok(Ok(found)) => Ok(found),
        Ok(Err(e)) => Err(unknown_outcome(e)),
        Err(_) => Err(timed_out("payout lookup", timeout)),
    }
}
