#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use clip_ledger::api::auth::{encode_token, Role};
use clip_ledger::api::stripe::signature_header;
use clip_ledger::config::PayoutSettings;
use clip_ledger::payments::{PaymentError, PaymentProcessor, Payout, TopUpSession};
use clip_ledger::store::MemoryLedgerStore;
use clip_ledger::AppState;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// How the fake provider answers payout calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutMode {
    Succeed,
    /// Definite rejection with this HTTP status.
    Reject(u16),
    /// Transport failure before the provider saw the request.
    Transport,
    /// The provider performs the payout but the response never arrives.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutCall {
    pub destination: String,
    pub amount: i64,
    pub idempotency_key: String,
}

/// In-process payment processor that records every call and deduplicates
/// payouts on the idempotency key like the real provider.
pub struct FakePayments {
    mode: Mutex<PayoutMode>,
    calls: Mutex<Vec<PayoutCall>>,
    issued: Mutex<HashMap<String, Payout>>,
    lookups: Mutex<Vec<String>>,
    sessions: Mutex<Vec<(i64, Uuid)>>,
}

impl FakePayments {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(PayoutMode::Succeed),
            calls: Mutex::new(Vec::new()),
            issued: Mutex::new(HashMap::new()),
            lookups: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub async fn set_mode(&self, mode: PayoutMode) {
        *self.mode.lock().await = mode;
    }

    pub async fn calls(&self) -> Vec<PayoutCall> {
        self.calls.lock().await.clone()
    }

    pub async fn lookups(&self) -> Vec<String> {
        self.lookups.lock().await.clone()
    }

    pub async fn sessions(&self) -> Vec<(i64, Uuid)> {
        self.sessions.lock().await.clone()
    }

    async fn issue(&self, amount: i64, key: &str) -> Payout {
        let mut issued = self.issued.lock().await;
        issued
            .entry(key.to_string())
            .or_insert_with(|| Payout {
                id: format!("tr_{}", Uuid::new_v4().simple()),
                amount,
            })
            .clone()
    }
}

#[async_trait]
impl PaymentProcessor for FakePayments {
    async fn create_top_up_session(
        &self,
        amount: i64,
        user_id: Uuid,
    ) -> Result<TopUpSession, PaymentError> {
        self.sessions.lock().await.push((amount, user_id));
        Ok(TopUpSession {
            id: "cs_test_1".to_string(),
            url: "https://checkout.test/cs_test_1".to_string(),
        })
    }

    async fn create_payout(
        &self,
        destination: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<Payout, PaymentError> {
        self.calls.lock().await.push(PayoutCall {
            destination: destination.to_string(),
            amount,
            idempotency_key: idempotency_key.to_string(),
        });
        let mode = *self.mode.lock().await;
        match mode {
            PayoutMode::Succeed => Ok(self.issue(amount, idempotency_key).await),
            PayoutMode::Reject(status) => Err(PaymentError::Api {
                status,
                body: "{\"error\":{\"message\":\"rejected\"}}".to_string(),
            }),
            PayoutMode::Transport => Err(PaymentError::Http("connection reset".to_string())),
            PayoutMode::Hang => {
                self.issue(amount, idempotency_key).await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(PaymentError::Http("unreachable".to_string()))
            }
        }
    }

    async fn find_payout(&self, idempotency_key: &str) -> Result<Option<Payout>, PaymentError> {
        self.lookups.lock().await.push(idempotency_key.to_string());
        Ok(self.issued.lock().await.get(idempotency_key).cloned())
    }
}

pub struct Harness {
    pub store: Arc<MemoryLedgerStore>,
    pub payments: Arc<FakePayments>,
    pub state: AppState,
    pub settings: PayoutSettings,
}

/// Fast timeout, long lease: a kept claim blocks concurrent callers.
pub fn quick_settings() -> PayoutSettings {
    PayoutSettings {
        timeout: Duration::from_millis(200),
        claim_lease: Duration::from_secs(120),
    }
}

pub fn harness() -> Harness {
    harness_with(quick_settings())
}

pub fn harness_with(settings: PayoutSettings) -> Harness {
    let store = Arc::new(MemoryLedgerStore::new());
    let payments = Arc::new(FakePayments::new());
    let state = AppState::new(
        store.clone(),
        payments.clone(),
        settings.clone(),
        WEBHOOK_SECRET,
        Duration::from_secs(300),
        JWT_SECRET,
    );
    Harness {
        store,
        payments,
        state,
        settings,
    }
}

pub fn token(user_id: Uuid, role: Role) -> String {
    encode_token(JWT_SECRET, user_id, role, chrono::Duration::hours(1)).expect("encode token")
}

pub fn bearer(user_id: Uuid, role: Role) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token(user_id, role)))
}

pub fn signed(payload: &[u8]) -> String {
    signature_header(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), payload)
}

pub fn top_up_event(event_id: &str, user_id: Uuid, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "amount_total": amount,
                "payment_status": "paid",
                "metadata": { "user_id": user_id.to_string(), "purpose": "top_up" }
            }
        }
    }))
    .expect("serialize event")
}

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Fresh, migrated database from `TEST_DATABASE_URL`, or `None` when unset.
pub async fn init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let Ok(test_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping postgres test");
        return None;
    };
    let (admin_url, db_name) =
        split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url)
        .await
        .expect("connect admin db");

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    sqlx::query(&create_sql)
        .execute(&admin_pool)
        .await
        .expect("create test db");

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url)
        .await
        .expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb { pool, _guard: guard })
}
