use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use clip_ledger::config::PayoutSettings;
use clip_ledger::db::PgLedgerStore;
use clip_ledger::models::{DeclarationStatus, PayoutMethod, WithdrawalStatus};
use clip_ledger::reconciler::DeclareViews;
use clip_ledger::store::LedgerStore;
use clip_ledger::AppState;

mod support;

use support::{FakePayments, PayoutMode};

async fn insert_user(pool: &PgPool, payout_account_id: Option<&str>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, payout_account_id) VALUES ($1, $2)")
        .bind(id)
        .bind(payout_account_id)
        .execute(pool)
        .await
        .expect("insert user");
    id
}

async fn user_balance(pool: &PgPool, id: Uuid) -> i64 {
    sqlx::query("SELECT balance FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("select user")
        .get("balance")
}

fn state(store: Arc<PgLedgerStore>, payments: Arc<FakePayments>) -> AppState {
    AppState::new(
        store,
        payments,
        PayoutSettings {
            timeout: Duration::from_millis(200),
            claim_lease: Duration::from_secs(120),
        },
        support::WEBHOOK_SECRET,
        Duration::from_secs(300),
        support::JWT_SECRET,
    )
}

#[tokio::test]
async fn event_credit_is_deduplicated_and_mirrored() {
    let Some(db) = support::init_test_db().await else {
        return;
    };
    let store = PgLedgerStore::new(db.pool.clone());
    let user = insert_user(&db.pool, None).await;

    assert_eq!(
        store.credit_for_event("evt_1", "checkout.session.completed", user, 500).await.unwrap(),
        Some(500)
    );
    assert_eq!(
        store.credit_for_event("evt_1", "checkout.session.completed", user, 500).await.unwrap(),
        None
    );
    assert_eq!(
        store.credit_for_event("evt_2", "checkout.session.completed", user, 250).await.unwrap(),
        Some(750)
    );

    assert_eq!(store.get_or_create_wallet(user).await.unwrap().balance, 750);
    assert_eq!(user_balance(&db.pool, user).await, 750);
}

#[tokio::test]
async fn debit_is_guarded_by_balance() {
    let Some(db) = support::init_test_db().await else {
        return;
    };
    let store = PgLedgerStore::new(db.pool.clone());
    let user = insert_user(&db.pool, Some("acct_1")).await;
    store.credit_wallet(user, 1_000).await.unwrap();

    assert_eq!(store.debit_wallet(user, 1_001).await.unwrap(), None);
    assert_eq!(store.debit_wallet(user, 600).await.unwrap(), Some(400));
    assert_eq!(store.debit_wallet(user, 400).await.unwrap(), Some(0));
    assert_eq!(store.debit_wallet(user, 1).await.unwrap(), None);
    assert_eq!(user_balance(&db.pool, user).await, 0);
}

#[tokio::test]
async fn declaration_lifecycle_against_postgres() {
    let Some(db) = support::init_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(db.pool.clone()));
    let payments = Arc::new(FakePayments::new());
    let state = state(store.clone(), payments.clone());
    let clipper = insert_user(&db.pool, Some("acct_clipper")).await;

    let declare = |views| DeclareViews {
        clipper_id: clipper,
        clip_url: "https://clips.example/c/pg".to_string(),
        declared_views: views,
        rate_cpm: 3_000,
        verification_code: Some("CLIP-PGTEST".to_string()),
    };

    let first = state.reconciler.declare_views(declare(5_000)).await.unwrap();
    assert_eq!(first.earnings, 15_000);
    let second = state.reconciler.declare_views(declare(8_000)).await.unwrap();
    assert_eq!(second.earnings, 24_000);
    let unchanged = state.reconciler.declare_views(declare(100)).await.unwrap();
    assert_eq!(unchanged.paid_views, 8_000);

    state.approvals.approve(first.id).await.unwrap();
    let paid = state.approvals.pay(first.id).await.unwrap();
    assert_eq!(paid.label(), "applied");
    assert_eq!(state.approvals.pay(first.id).await.unwrap().label(), "already_processed");

    let stored = store.get_declaration(first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeclarationStatus::Paid);
    assert_eq!(stored.verification_code.as_deref(), Some("CLIP-PGTEST"));
    assert!(stored.payout_claimed_at.is_none());
    assert_eq!(payments.calls().await.len(), 1);
    assert_eq!(payments.calls().await[0].amount, 24_000);
}

#[tokio::test]
async fn stale_claims_are_listed_for_reconciliation() {
    let Some(db) = support::init_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(db.pool.clone()));
    let payments = Arc::new(FakePayments::new());
    let state = state(store.clone(), payments.clone());
    let clipper = insert_user(&db.pool, Some("acct_clipper")).await;

    let d = state
        .reconciler
        .declare_views(DeclareViews {
            clipper_id: clipper,
            clip_url: "https://clips.example/c/stale".to_string(),
            declared_views: 1_000,
            rate_cpm: 3_000,
            verification_code: None,
        })
        .await
        .unwrap();
    state.approvals.approve(d.id).await.unwrap();

    let then = Utc::now() - chrono::Duration::minutes(10);
    assert!(store
        .claim_declaration_payout(d.id, then, then)
        .await
        .unwrap());
    // a fresh claim blocks a second claimer
    assert!(!store
        .claim_declaration_payout(d.id, Utc::now(), then - chrono::Duration::minutes(1))
        .await
        .unwrap());

    let stale = store
        .stale_declaration_claims(Utc::now() - chrono::Duration::minutes(5), 10)
        .await
        .unwrap();
    assert_eq!(stale, vec![d.id]);
}

#[tokio::test]
async fn failed_withdrawal_refunds_in_one_step() {
    let Some(db) = support::init_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(db.pool.clone()));
    let payments = Arc::new(FakePayments::new());
    let state = state(store.clone(), payments.clone());
    let user = insert_user(&db.pool, Some("acct_user")).await;
    store.credit_wallet(user, 3_000).await.unwrap();

    let w = state
        .withdrawals
        .request_withdrawal(user, 2_000, PayoutMethod::BankTransfer)
        .await
        .unwrap();
    assert_eq!(store.get_or_create_wallet(user).await.unwrap().balance, 1_000);

    payments.set_mode(PayoutMode::Reject(400)).await;
    assert!(state.withdrawals.process_withdrawal(w.id).await.is_err());

    let stored = store.get_withdrawal(w.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Failed);
    assert_eq!(store.get_or_create_wallet(user).await.unwrap().balance, 3_000);
    assert_eq!(user_balance(&db.pool, user).await, 3_000);

    // already failed: no second refund
    assert!(!store.fail_withdrawal(w.id, "again", Utc::now()).await.unwrap());
    assert_eq!(store.get_or_create_wallet(user).await.unwrap().balance, 3_000);
}
