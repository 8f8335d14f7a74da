// src/reconcile.rs
//
// Periodic pass over payouts whose claim outlived the lease: the provider
// call timed out or the process died mid-payout. Re-running `pay` or
// `process_withdrawal` asks the provider first and only re-issues when it has
// no record of the payout.

use std::time::Duration;

use chrono::Utc;

use crate::config::PayoutSettings;
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub declarations: usize,
    pub withdrawals: usize,
    pub failures: usize,
}

/// One reconciliation pass. Individual failures are logged and counted; the
/// claim stays in place for the next pass.
pub async fn sweep_once(
    state: &AppState,
    settings: &PayoutSettings,
    batch_size: i64,
) -> Result<SweepReport> {
    let stale_before = Utc::now() - settings.lease();
    let mut report = SweepReport::default();

    for id in state
        .store
        .stale_declaration_claims(stale_before, batch_size)
        .await?
    {
        match state.approvals.pay(id).await {
            Ok(outcome) => {
                log::info!(
                    "reconcile declaration id={} outcome={}",
                    id,
                    outcome.label()
                );
                report.declarations += 1;
            }
            Err(e) => {
                log::warn!("reconcile declaration id={} err={}", id, e);
                report.failures += 1;
            }
        }
    }

    for id in state
        .store
        .stale_withdrawal_claims(stale_before, batch_size)
        .await?
    {
        match state.withdrawals.process_withdrawal(id).await {
            Ok(outcome) => {
                log::info!(
                    "reconcile withdrawal id={} outcome={}",
                    id,
                    outcome.label()
                );
                report.withdrawals += 1;
            }
            Err(e) => {
                log::warn!("reconcile withdrawal id={} err={}", id, e);
                report.failures += 1;
            }
        }
    }

    Ok(report)
}

/// Runs [`sweep_once`] every `interval` until the runtime shuts down.
/// Returns `None` when `interval` is zero.
pub fn spawn(
    state: AppState,
    settings: PayoutSettings,
    interval: Duration,
    batch_size: i64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval.is_zero() {
        log::info!("payout reconciliation disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(&state, &settings, batch_size).await {
                Ok(report) if report != SweepReport::default() => {
                    log::info!(
                        "reconcile pass declarations={} withdrawals={} failures={}",
                        report.declarations,
                        report.withdrawals,
                        report.failures
                    );
                }
                Ok(_) => {}
                Err(e) => log::error!("reconcile pass failed: {}", e),
            }
        }
    }))
}
