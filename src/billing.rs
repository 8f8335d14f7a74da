// src/billing.rs

use crate::error::{LedgerError, Result};

pub const VIEWS_PER_MILLE: i128 = 1000;

/// Earnings for `views` at `rate_cpm` minor units per thousand views, rounded down.
pub fn earnings_for(views: i64, rate_cpm: i64) -> Result<i64> {
    let raw = i128::from(views) * i128::from(rate_cpm) / VIEWS_PER_MILLE;
    i64::try_from(raw).map_err(|_| {
        LedgerError::Validation(format!("earnings overflow for views={views} rate_cpm={rate_cpm}"))
    })
}

/// Earnings owed for moving `paid_views` from `from_views` to `to_views`.
///
/// Computed as a difference of floors so that, at a fixed rate, the running sum
/// always equals `earnings_for(to_views, rate_cpm)` with no rounding drift.
pub fn earnings_increment(from_views: i64, to_views: i64, rate_cpm: i64) -> Result<i64> {
    if to_views <= from_views {
        return Ok(0);
    }
    Ok(earnings_for(to_views, rate_cpm)? - earnings_for(from_views, rate_cpm)?)
}

/// Validates and applies a credit to a balance.
pub fn checked_credit(balance: i64, amount: i64) -> Result<i64> {
    balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Validation("balance overflow".to_string()))
}

/// Balance after a debit, or `None` when funds are insufficient.
pub fn checked_debit(balance: i64, amount: i64) -> Option<i64> {
    balance.checked_sub(amount).filter(|b| *b >= 0)
}

pub fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::Validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
