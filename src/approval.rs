// src/approval.rs
//
// Declaration lifecycle: one transition table, everything else is refused.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::PayoutSettings;
use crate::error::{LedgerError, Result};
use crate::models::{Declaration, DeclarationStatus};
use crate::payments::{
    declaration_payout_key, lookup_payout, timed_out, unknown_outcome, PaymentProcessor,
};
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
    Pay,
    /// A higher view count arrived from the reconciler.
    Redeclare,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Pay => "pay",
            Action::Redeclare => "redeclare",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(DeclarationStatus),
    /// The action already took effect; nothing to do.
    AlreadyApplied,
}

/// The only authority on which declaration transitions exist.
pub fn transition(from: DeclarationStatus, action: Action) -> Result<Transition> {
    use DeclarationStatus::*;

    let next = match (from, action) {
        (Pending, Action::Approve) => Transition::To(Approved),
        (Pending, Action::Reject) => Transition::To(Rejected),
        (Approved, Action::Pay) => Transition::To(Paid),
        (Pending | Approved | Rejected, Action::Redeclare) => Transition::To(Pending),

        (Approved | Paid, Action::Approve) => Transition::AlreadyApplied,
        (Rejected, Action::Reject) => Transition::AlreadyApplied,
        (Paid, Action::Pay) => Transition::AlreadyApplied,

        (status, action) => {
            return Err(LedgerError::InvalidTransition {
                entity: "declaration",
                status: status.to_string(),
                action: action.as_str(),
            })
        }
    };
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    AlreadyApplied(T),
    /// Another caller holds the payout claim.
    InProgress(T),
}

impl<T> Outcome<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied(_) => "applied",
            Outcome::AlreadyApplied(_) => "already_processed",
            Outcome::InProgress(_) => "in_progress",
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Applied(v) | Outcome::AlreadyApplied(v) | Outcome::InProgress(v) => v,
        }
    }
}

pub struct ApprovalService {
    store: Arc<dyn LedgerStore>,
    payments: Arc<dyn PaymentProcessor>,
    settings: PayoutSettings,
}

impl ApprovalService {
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

    async fn load(&self, id: Uuid) -> Result<Declaration> {
        self.store
            .get_declaration(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("declaration", id))
    }

    pub async fn approve(&self, id: Uuid) -> Result<Outcome<Declaration>> {
        self.apply(id, Action::Approve, None).await
    }

    pub async fn reject(&self, id: Uuid, reason: Option<&str>) -> Result<Outcome<Declaration>> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.apply(id, Action::Reject, reason).await
    }

    async fn apply(
        &self,
        id: Uuid,
        action: Action,
        reason: Option<&str>,
    ) -> Result<Outcome<Declaration>> {
        let current = self.load(id).await?;
        let target = match transition(current.status, action)? {
            Transition::AlreadyApplied => return Ok(Outcome::AlreadyApplied(current)),
            Transition::To(target) => target,
        };

        let moved = self
            .store
            .transition_declaration(id, current.status, target, reason, Utc::now())
            .await?;

        let latest = self.load(id).await?;
        if moved {
            log::info!(
                "declaration {} id={} {} -> {}",
                action.as_str(),
                id,
                current.status,
                latest.status
            );
            return Ok(Outcome::Applied(latest));
        }

        // lost a race; judge the action against whatever won
        match transition(latest.status, action)? {
            Transition::AlreadyApplied => Ok(Outcome::AlreadyApplied(latest)),
            Transition::To(_) if latest.payout_claimed_at.is_some() => {
                Ok(Outcome::InProgress(latest))
            }
            Transition::To(_) => Err(LedgerError::Conflict(format!(
                "declaration {id} changed during {}",
                action.as_str()
            ))),
        }
    }

    /// Pays out an approved declaration's earnings exactly once.
    pub async fn pay(&self, id: Uuid) -> Result<Outcome<Declaration>> {
        let current = self.load(id).await?;
        if let Transition::AlreadyApplied = transition(current.status, Action::Pay)? {
            return Ok(Outcome::AlreadyApplied(current));
        }

        let now = Utc::now();
        let stale_before = now - self.settings.lease();
        if !self
            .store
            .claim_declaration_payout(id, now, stale_before)
            .await?
        {
            let latest = self.load(id).await?;
            return match transition(latest.status, Action::Pay)? {
                Transition::AlreadyApplied => Ok(Outcome::AlreadyApplied(latest)),
                Transition::To(_) => Ok(Outcome::InProgress(latest)),
            };
        }

        // the claim freezes earnings; read the amount we are about to send
        let claimed = self.load(id).await?;
        let key = declaration_payout_key(id);

        if current.payout_claimed_at.is_some() {
            // a previous attempt ended without a known outcome
            let found =
                lookup_payout(self.payments.as_ref(), &key, self.settings.timeout).await?;
            if let Some(payout) = found {
                log::info!(
                    "declaration payout reconciled id={} payout_id={}",
                    id,
                    payout.id
                );
                return self.finish(id, Some(&payout.id)).await;
            }
        }

        if claimed.earnings <= 0 {
            return self.finish(id, None).await;
        }

        let destination = self
            .store
            .user_profile(claimed.clipper_id)
            .await?
            .and_then(|profile| profile.payout_account_id);
        let Some(destination) = destination else {
            self.store.release_declaration_payout(id).await?;
            return Err(LedgerError::Validation(format!(
                "clipper {} has no connected payout account",
                claimed.clipper_id
            )));
        };

        let call = self
            .payments
            .create_payout(&destination, claimed.earnings, &key);
        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(Ok(payout)) => {
                log::info!(
                    "declaration payout sent id={} amount={} payout_id={}",
                    id,
                    claimed.earnings,
                    payout.id
                );
                self.finish(id, Some(&payout.id)).await
            }
            Ok(Err(e)) if e.is_definite() => {
                log::warn!("declaration payout rejected id={} err={}", id, e);
                self.store.release_declaration_payout(id).await?;
                Err(LedgerError::ExternalService {
                    message: e.to_string(),
                    retryable: true,
                })
            }
            Ok(Err(e)) => {
                log::error!(
                    "declaration payout outcome unknown id={} err={}; claim kept for reconciliation",
                    id,
                    e
                );
                Err(unknown_outcome(e))
            }
            Err(_) => {
                log::error!(
                    "declaration payout timed out id={} after {:?}; claim kept for reconciliation",
                    id,
                    self.settings.timeout
                );
                Err(timed_out("payout", self.settings.timeout))
            }
        }
    }

    async fn finish(&self, id: Uuid, payout_id: Option<&str>) -> Result<Outcome<Declaration>> {
        let completed = self
            .store
            .complete_declaration_payout(id, payout_id, Utc::now())
            .await?;
        let latest = self.load(id).await?;
        if completed {
            Ok(Outcome::Applied(latest))
        } else if latest.status == DeclarationStatus::Paid {
            Ok(Outcome::AlreadyApplied(latest))
        } else {
            Err(LedgerError::Internal(format!(
                "declaration {id} left {} after a successful payout",
                latest.status
            )))
        }
    }
}
