// src/store.rs
//
// Ledger storage boundary. Every method is one atomic operation against the
// backing store; callers never get cross-call transactions.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::billing::{checked_credit, checked_debit};
use crate::error::{LedgerError, Result};
use crate::models::{
    Declaration, DeclarationStatus, UserProfile, Wallet, Withdrawal, WithdrawalStatus,
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_declaration(&self, id: Uuid) -> Result<Option<Declaration>>;

    async fn find_declaration(
        &self,
        clipper_id: Uuid,
        clip_url: &str,
    ) -> Result<Option<Declaration>>;

    /// Returns `false` when a declaration for the same `(clipper_id, clip_url)` exists.
    async fn insert_declaration(&self, declaration: &Declaration) -> Result<bool>;

    /// Writes the view/earnings/status fields of `updated` only if the stored row
    /// still has `expected_paid_views`, `expected_status` and no payout claim.
    async fn update_declaration_views(
        &self,
        updated: &Declaration,
        expected_paid_views: i64,
        expected_status: DeclarationStatus,
    ) -> Result<bool>;

    async fn transition_declaration(
        &self,
        id: Uuid,
        from: DeclarationStatus,
        to: DeclarationStatus,
        rejection_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Marks an approved declaration as having a payout in flight. Succeeds only if
    /// there is no claim or the existing claim is older than `stale_before`.
    async fn claim_declaration_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    /// approved -> paid, clearing the claim.
    async fn complete_declaration_payout(
        &self,
        id: Uuid,
        payout_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn release_declaration_payout(&self, id: Uuid) -> Result<bool>;

    async fn list_declarations_for_clipper(&self, clipper_id: Uuid) -> Result<Vec<Declaration>>;

    async fn list_declarations_for_clip(&self, clip_url: &str) -> Result<Vec<Declaration>>;

    async fn stale_declaration_claims(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>>;

    async fn user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet>;

    /// Atomic increment of the wallet and its profile mirror. Returns the new balance.
    async fn credit_wallet(&self, user_id: Uuid, amount: i64) -> Result<i64>;

    /// Atomic decrement guarded by `balance >= amount`. `None` when funds are short.
    async fn debit_wallet(&self, user_id: Uuid, amount: i64) -> Result<Option<i64>>;

    /// Records `event_id` as processed and credits the wallet in the same operation.
    /// `None` when the event was already processed.
    async fn credit_for_event(
        &self,
        event_id: &str,
        event_type: &str,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Option<i64>>;

    /// Returns `false` when `event_id` was already processed.
    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool>;

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<()>;

    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>>;

    async fn list_withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<Withdrawal>>;

    async fn claim_withdrawal(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    async fn complete_withdrawal(
        &self,
        id: Uuid,
        payout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// pending -> failed and the held amount goes back to the wallet, atomically.
    async fn fail_withdrawal(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn stale_withdrawal_claims(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>>;
}

#[derive(Default)]
struct MemoryState {
    declarations: HashMap<Uuid, Declaration>,
    declaration_keys: HashMap<(Uuid, String), Uuid>,
    users: HashMap<Uuid, UserProfile>,
    wallets: HashMap<Uuid, Wallet>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    processed_events: HashSet<String>,
}

impl MemoryState {
    fn credit(&mut self, user_id: Uuid, amount: i64) -> Result<i64> {
        let now = Utc::now();
        let wallet = self.wallets.entry(user_id).or_insert_with(|| Wallet {
            user_id,
            balance: 0,
            updated_at: now,
        });
        let balance = checked_credit(wallet.balance, amount)?;
        wallet.balance = balance;
        wallet.updated_at = now;
        if let Some(user) = self.users.get_mut(&user_id) {
            user.balance = balance;
        }
        Ok(balance)
    }
}

fn is_claimable(claimed_at: Option<DateTime<Utc>>, stale_before: DateTime<Utc>) -> bool {
    claimed_at.map_or(true, |at| at < stale_before)
}

/// In-process store for tests and database-less runs.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,
    fail_withdrawal_insert: RwLock<bool>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, id: Uuid, payout_account_id: Option<&str>) {
        let mut state = self.state.write().await;
        let balance = state.wallets.get(&id).map_or(0, |w| w.balance);
        state.users.insert(
            id,
            UserProfile {
                id,
                balance,
                payout_account_id: payout_account_id.map(str::to_string),
            },
        );
    }

    pub async fn set_fail_withdrawal_insert(&self, fail: bool) {
        *self.fail_withdrawal_insert.write().await = fail;
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_declaration(&self, id: Uuid) -> Result<Option<Declaration>> {
        Ok(self.state.read().await.declarations.get(&id).cloned())
    }

    async fn find_declaration(
        &self,
        clipper_id: Uuid,
        clip_url: &str,
    ) -> Result<Option<Declaration>> {
        let state = self.state.read().await;
        Ok(state
            .declaration_keys
            .get(&(clipper_id, clip_url.to_string()))
            .and_then(|id| state.declarations.get(id))
            .cloned())
    }

    async fn insert_declaration(&self, declaration: &Declaration) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = (declaration.clipper_id, declaration.clip_url.clone());
        if state.declaration_keys.contains_key(&key) {
            return Ok(false);
        }
        state.declaration_keys.insert(key, declaration.id);
        state
            .declarations
            .insert(declaration.id, declaration.clone());
        Ok(true)
    }

    async fn update_declaration_views(
        &self,
        updated: &Declaration,
        expected_paid_views: i64,
        expected_status: DeclarationStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(current) = state.declarations.get_mut(&updated.id) else {
            return Ok(false);
        };
        if current.paid_views != expected_paid_views
            || current.status != expected_status
            || current.payout_claimed_at.is_some()
        {
            return Ok(false);
        }
        current.declared_views = updated.declared_views;
        current.paid_views = updated.paid_views;
        current.earnings = updated.earnings;
        current.status = updated.status;
        if updated.verification_code.is_some() {
            current.verification_code = updated.verification_code.clone();
        }
        current.rejection_reason = updated.rejection_reason.clone();
        current.updated_at = updated.updated_at;
        Ok(true)
    }

    async fn transition_declaration(
        &self,
        id: Uuid,
        from: DeclarationStatus,
        to: DeclarationStatus,
        rejection_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.declarations.get_mut(&id) {
            Some(d) if d.status == from && d.payout_claimed_at.is_none() => {
                d.status = to;
                if rejection_reason.is_some() {
                    d.rejection_reason = rejection_reason.map(str::to_string);
                }
                d.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_declaration_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.declarations.get_mut(&id) {
            Some(d)
                if d.status == DeclarationStatus::Approved
                    && is_claimable(d.payout_claimed_at, stale_before) =>
            {
                d.payout_claimed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_declaration_payout(
        &self,
        id: Uuid,
        payout_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.declarations.get_mut(&id) {
            Some(d) if d.status == DeclarationStatus::Approved => {
                d.status = DeclarationStatus::Paid;
                d.payout_id = payout_id.map(str::to_string);
                d.payout_claimed_at = None;
                d.paid_at = Some(now);
                d.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_declaration_payout(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.declarations.get_mut(&id) {
            Some(d) if d.status == DeclarationStatus::Approved && d.payout_claimed_at.is_some() => {
                d.payout_claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_declarations_for_clipper(&self, clipper_id: Uuid) -> Result<Vec<Declaration>> {
        let state = self.state.read().await;
        let mut out: Vec<Declaration> = state
            .declarations
            .values()
            .filter(|d| d.clipper_id == clipper_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_declarations_for_clip(&self, clip_url: &str) -> Result<Vec<Declaration>> {
        let state = self.state.read().await;
        let mut out: Vec<Declaration> = state
            .declarations
            .values()
            .filter(|d| d.clip_url == clip_url)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn stale_declaration_claims(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .declarations
            .values()
            .filter(|d| {
                d.status == DeclarationStatus::Approved
                    && d.payout_claimed_at.is_some_and(|at| at < stale_before)
            })
            .map(|d| d.id)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        let mut state = self.state.write().await;
        let wallet = state.wallets.entry(user_id).or_insert_with(|| Wallet {
            user_id,
            balance: 0,
            updated_at: Utc::now(),
        });
        Ok(wallet.clone())
    }

    async fn credit_wallet(&self, user_id: Uuid, amount: i64) -> Result<i64> {
        self.state.write().await.credit(user_id, amount)
    }

    async fn debit_wallet(&self, user_id: Uuid, amount: i64) -> Result<Option<i64>> {
        let mut state = self.state.write().await;
        let Some(wallet) = state.wallets.get_mut(&user_id) else {
            return Ok(None);
        };
        let Some(balance) = checked_debit(wallet.balance, amount) else {
            return Ok(None);
        };
        wallet.balance = balance;
        wallet.updated_at = Utc::now();
        if let Some(user) = state.users.get_mut(&user_id) {
            user.balance = balance;
        }
        Ok(Some(balance))
    }

    async fn credit_for_event(
        &self,
        event_id: &str,
        _event_type: &str,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Option<i64>> {
        let mut state = self.state.write().await;
        if state.processed_events.contains(event_id) {
            return Ok(None);
        }
        let balance = state.credit(user_id, amount)?;
        state.processed_events.insert(event_id.to_string());
        Ok(Some(balance))
    }

    async fn record_event(&self, event_id: &str, _event_type: &str) -> Result<bool> {
        Ok(self
            .state
            .write()
            .await
            .processed_events
            .insert(event_id.to_string()))
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<()> {
        if *self.fail_withdrawal_insert.read().await {
            return Err(LedgerError::Internal("injected withdrawal insert failure".to_string()));
        }
        self.state
            .write()
            .await
            .withdrawals
            .insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>> {
        Ok(self.state.read().await.withdrawals.get(&id).cloned())
    }

    async fn list_withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<Withdrawal>> {
        let state = self.state.read().await;
        let mut out: Vec<Withdrawal> = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn claim_withdrawal(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.withdrawals.get_mut(&id) {
            Some(w)
                if w.status == WithdrawalStatus::Pending
                    && is_claimable(w.processing_since, stale_before) =>
            {
                w.processing_since = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_withdrawal(
        &self,
        id: Uuid,
        payout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.withdrawals.get_mut(&id) {
            Some(w) if w.status == WithdrawalStatus::Pending => {
                w.status = WithdrawalStatus::Completed;
                w.payout_id = Some(payout_id.to_string());
                w.processing_since = None;
                w.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_withdrawal(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        let (user_id, amount) = match state.withdrawals.get(&id) {
            Some(w) if w.status == WithdrawalStatus::Pending => (w.user_id, w.amount),
            _ => return Ok(false),
        };
        state.credit(user_id, amount)?;
        if let Some(w) = state.withdrawals.get_mut(&id) {
            w.status = WithdrawalStatus::Failed;
            w.failure_reason = Some(reason.to_string());
            w.processing_since = None;
            w.completed_at = Some(now);
        }
        Ok(true)
    }

    async fn stale_withdrawal_claims(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .withdrawals
            .values()
            .filter(|w| {
                w.status == WithdrawalStatus::Pending
                    && w.processing_since.is_some_and(|at| at < stale_before)
            })
            .map(|w| w.id)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }
}
