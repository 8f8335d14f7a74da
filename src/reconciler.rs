// src/reconciler.rs

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::approval::{transition, Action, Transition};
use crate::billing::{earnings_for, earnings_increment};
use crate::error::{LedgerError, Result};
use crate::models::{Declaration, DeclarationStatus};
use crate::store::LedgerStore;

/// Optimistic-update attempts before giving up on a contended declaration.
const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct DeclareViews {
    pub clipper_id: Uuid,
    pub clip_url: String,
    pub declared_views: i64,
    /// Minor units per thousand views, supplied by the campaign.
    pub rate_cpm: i64,
    pub verification_code: Option<String>,
}

/// Short code a clipper puts in their bio so reviewers can tie the account to the report.
pub fn generate_verification_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("CLIP-{}", raw[..6].to_uppercase())
}

/// Turns self-reported cumulative view counts into monotonically growing earnings.
pub struct DeclarationReconciler {
    store: Arc<dyn LedgerStore>,
}

impl DeclarationReconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn declare_views(&self, req: DeclareViews) -> Result<Declaration> {
        let clip_url = req.clip_url.trim().to_string();
        if clip_url.is_empty() {
            return Err(LedgerError::Validation("clip_url is required".to_string()));
        }
        if req.declared_views < 0 {
            return Err(LedgerError::Validation(format!(
                "declared_views must not be negative, got {}",
                req.declared_views
            )));
        }
        if req.rate_cpm < 0 {
            return Err(LedgerError::Validation(format!(
                "rate_cpm must not be negative, got {}",
                req.rate_cpm
            )));
        }
        let verification_code = req
            .verification_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        for _ in 0..MAX_ATTEMPTS {
            let existing = self.store.find_declaration(req.clipper_id, &clip_url).await?;

            let Some(existing) = existing else {
                let now = Utc::now();
                let created = Declaration {
                    id: Uuid::new_v4(),
                    clipper_id: req.clipper_id,
                    clip_url: clip_url.clone(),
                    declared_views: req.declared_views,
                    paid_views: req.declared_views,
                    earnings: earnings_for(req.declared_views, req.rate_cpm)?,
                    status: DeclarationStatus::Pending,
                    verification_code: Some(
                        verification_code
                            .clone()
                            .unwrap_or_else(generate_verification_code),
                    ),
                    rejection_reason: None,
                    payout_id: None,
                    payout_claimed_at: None,
                    paid_at: None,
                    created_at: now,
                    updated_at: now,
                };
                if self.store.insert_declaration(&created).await? {
                    log::info!(
                        "declaration created id={} clipper_id={} views={} earnings={}",
                        created.id,
                        created.clipper_id,
                        created.paid_views,
                        created.earnings
                    );
                    return Ok(created);
                }
                // a concurrent first declaration won the unique key
                continue;
            };

            if req.declared_views <= existing.paid_views {
                return Ok(existing);
            }

            if existing.status == DeclarationStatus::Paid {
                log::warn!(
                    "declaration re-declared after payout id={} paid_views={} declared={}",
                    existing.id,
                    existing.paid_views,
                    req.declared_views
                );
                return Err(LedgerError::Validation(format!(
                    "declaration {} is already paid; views after payout are not compensated",
                    existing.id
                )));
            }

            if existing.payout_claimed_at.is_some() {
                return Err(LedgerError::Conflict(format!(
                    "payout in progress for declaration {}",
                    existing.id
                )));
            }

            let status = match transition(existing.status, Action::Redeclare)? {
                Transition::To(status) => status,
                Transition::AlreadyApplied => existing.status,
            };
            let increment =
                earnings_increment(existing.paid_views, req.declared_views, req.rate_cpm)?;

            let mut updated = existing.clone();
            updated.declared_views = req.declared_views;
            updated.paid_views = req.declared_views;
            updated.earnings = existing
                .earnings
                .checked_add(increment)
                .ok_or_else(|| LedgerError::Validation("earnings overflow".to_string()))?;
            updated.status = status;
            if status == DeclarationStatus::Pending {
                updated.rejection_reason = None;
            }
            if verification_code.is_some() {
                updated.verification_code = verification_code.clone();
            }
            updated.updated_at = Utc::now();

            if self
                .store
                .update_declaration_views(&updated, existing.paid_views, existing.status)
                .await?
            {
                log::info!(
                    "declaration updated id={} views {} -> {} earnings +{} = {} status={}",
                    updated.id,
                    existing.paid_views,
                    updated.paid_views,
                    increment,
                    updated.earnings,
                    updated.status
                );
                return Ok(updated);
            }
        }

        Err(LedgerError::Conflict(format!(
            "declaration for clipper {} on {} is under concurrent update",
            req.clipper_id, clip_url
        )))
    }

    pub async fn declarations_for_clipper(&self, clipper_id: Uuid) -> Result<Vec<Declaration>> {
        self.store.list_declarations_for_clipper(clipper_id).await
    }

    pub async fn declarations_for_clip(&self, clip_url: &str) -> Result<Vec<Declaration>> {
        self.store.list_declarations_for_clip(clip_url.trim()).await
    }

    pub async fn declaration(&self, id: Uuid) -> Result<Declaration> {
        self.store
            .get_declaration(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("declaration", id))
    }
}
