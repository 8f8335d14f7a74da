// src/withdrawal.rs
//
// Funds are held (debited) when the request is accepted, sent when processed,
// and returned to the wallet if the payout definitely failed.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::approval::Outcome;
use crate::billing::validate_amount;
use crate::config::PayoutSettings;
use crate::error::{LedgerError, Result};
use crate::models::{PayoutMethod, Withdrawal, WithdrawalStatus};
use crate::payments::{
    lookup_payout, timed_out, unknown_outcome, withdrawal_payout_key, PaymentProcessor,
};
use crate::store::LedgerStore;

pub struct WithdrawalService {
    store: Arc<dyn LedgerStore>,
    payments: Arc<dyn PaymentProcessor>,
    settings: PayoutSettings,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        payments: Arc<dyn PaymentProcessor>,
        settings: PayoutSettings,
    ) -> Self {
        Self {
            store,
            payments,
            settings,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Withdrawal> {
        self.store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("withdrawal", id))
    }

    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: i64,
        method: PayoutMethod,
    ) -> Result<Withdrawal> {
        validate_amount(amount)?;

        let profile = self
            .store
            .user_profile(user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;
        let destination = profile.payout_account_id.ok_or_else(|| {
            LedgerError::Validation("no connected payout account for withdrawals".to_string())
        })?;

        let Some(remaining) = self.store.debit_wallet(user_id, amount).await? else {
            let balance = self.store.get_or_create_wallet(user_id).await?.balance;
            log::warn!(
                "withdrawal refused user_id={} amount={} balance={}",
                user_id,
                amount,
                balance
            );
            return Err(LedgerError::Validation(format!(
                "insufficient balance: requested {amount}, available {balance}"
            )));
        };

        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id,
            amount,
            method,
            destination,
            status: WithdrawalStatus::Pending,
            payout_id: None,
            failure_reason: None,
            processing_since: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        if let Err(e) = self.store.insert_withdrawal(&withdrawal).await {
            log::error!(
                "withdrawal insert failed user_id={} amount={} err={}; returning held funds",
                user_id,
                amount,
                e
            );
            if let Err(refund_err) = self.store.credit_wallet(user_id, amount).await {
                log::error!(
                    "withdrawal hold refund failed user_id={} amount={} err={}",
                    user_id,
                    amount,
                    refund_err
                );
            }
            return Err(e);
        }

        log::info!(
            "withdrawal requested id={} user_id={} amount={} remaining={}",
            withdrawal.id,
            user_id,
            amount,
            remaining
        );
        Ok(withdrawal)
    }

    pub async fn withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<Withdrawal>> {
        self.store.list_withdrawals_for_user(user_id).await
    }

    /// Sends the held amount to the withdrawal's destination, at most once.
    pub async fn process_withdrawal(&self, id: Uuid) -> Result<Outcome<Withdrawal>> {
        let current = self.load(id).await?;
        if current.status.is_terminal() {
            return Ok(Outcome::AlreadyApplied(current));
        }

        let now = Utc::now();
        let stale_before = now - self.settings.lease();
        if !self.store.claim_withdrawal(id, now, stale_before).await? {
            let latest = self.load(id).await?;
            return Ok(if latest.status.is_terminal() {
                Outcome::AlreadyApplied(latest)
            } else {
                Outcome::InProgress(latest)
            });
        }

        let key = withdrawal_payout_key(id);
        if current.processing_since.is_some() {
            let found =
                lookup_payout(self.payments.as_ref(), &key, self.settings.timeout).await?;
            if let Some(payout) = found {
                log::info!(
                    "withdrawal payout reconciled id={} payout_id={}",
                    id,
                    payout.id
                );
                return self.complete(id, &payout.id).await;
            }
        }

        let call = self
            .payments
            .create_payout(&current.destination, current.amount, &key);
        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(Ok(payout)) => {
                log::info!(
                    "withdrawal payout sent id={} amount={} payout_id={}",
                    id,
                    current.amount,
                    payout.id
                );
                self.complete(id, &payout.id).await
            }
            Ok(Err(e)) if e.is_definite() => {
                log::warn!("withdrawal payout rejected id={} err={}", id, e);
                if self
                    .store
                    .fail_withdrawal(id, &e.to_string(), Utc::now())
                    .await?
                {
                    return Err(LedgerError::ExternalService {
                        message: format!("{e}; withdrawal marked failed and funds returned"),
                        retryable: false,
                    });
                }
                // another pass settled the row after our claim went stale
                let latest = self.load(id).await?;
                log::warn!(
                    "withdrawal id={} already {} when its rejected payout came back; nothing refunded",
                    id,
                    latest.status
                );
                if latest.status.is_terminal() {
                    Ok(Outcome::AlreadyApplied(latest))
                } else {
                    Err(LedgerError::Conflict(format!(
                        "withdrawal {id} changed while its payout was rejected"
                    )))
                }
            }
            Ok(Err(e)) => {
                log::error!(
                    "withdrawal payout outcome unknown id={} err={}; claim kept for reconciliation",
                    id,
                    e
                );
                Err(unknown_outcome(e))
            }
            Err(_) => {
                log::error!(
                    "withdrawal payout timed out id={} after {:?}; claim kept for reconciliation",
                    id,
                    self.settings.timeout
                );
                Err(timed_out("payout", self.settings.timeout))
            }
        }
    }

    async fn complete(&self, id: Uuid, payout_id: &str) -> Result<Outcome<Withdrawal>> {
        let completed = self
            .store
            .complete_withdrawal(id, payout_id, Utc::now())
            .await?;
        let latest = self.load(id).await?;
        if completed {
            Ok(Outcome::Applied(latest))
        } else if latest.status == WithdrawalStatus::Completed {
            Ok(Outcome::AlreadyApplied(latest))
        } else {
            Err(LedgerError::Internal(format!(
                "withdrawal {id} left {} after a successful payout",
                latest.status
            )))
        }
    }
}
