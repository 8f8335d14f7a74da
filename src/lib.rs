pub mod api;
pub mod approval;
pub mod billing;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod models;
pub mod payments;
pub mod reconcile;
pub mod reconciler;
pub mod store;
pub mod webhook;
pub mod withdrawal;

use std::sync::Arc;
use std::time::Duration;

use crate::approval::ApprovalService;
use crate::config::PayoutSettings;
use crate::payments::PaymentProcessor;
use crate::reconciler::DeclarationReconciler;
use crate::store::LedgerStore;
use crate::webhook::WebhookProcessor;
use crate::withdrawal::WithdrawalService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub reconciler: Arc<DeclarationReconciler>,
    pub approvals: Arc<ApprovalService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub jwt_secret: String,
}

impl AppState {
    /// Wires every service onto one store and one payment processor.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        payments: Arc<dyn PaymentProcessor>,
        payouts: PayoutSettings,
        webhook_secret: &str,
        webhook_tolerance: Duration,
        jwt_secret: &str,
    ) -> Self {
        Self {
            reconciler: Arc::new(DeclarationReconciler::new(store.clone())),
            approvals: Arc::new(ApprovalService::new(
                store.clone(),
                payments.clone(),
                payouts.clone(),
            )),
            withdrawals: Arc::new(WithdrawalService::new(
                store.clone(),
                payments.clone(),
                payouts,
            )),
            webhooks: Arc::new(WebhookProcessor::new(
                store.clone(),
                webhook_secret,
                webhook_tolerance,
            )),
            store,
            payments,
            jwt_secret: jwt_secret.to_string(),
        }
    }
}
