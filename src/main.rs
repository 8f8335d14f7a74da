// src/main.rs
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use clip_ledger::api::stripe_client::StripeClient;
use clip_ledger::config::{AppConfig, StoreBackend};
use clip_ledger::db::PgLedgerStore;
use clip_ledger::payments::PaymentProcessor;
use clip_ledger::store::{LedgerStore, MemoryLedgerStore};
use clip_ledger::{api, docs, reconcile, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{context}: {e}");
    std::io::Error::new(std::io::ErrorKind::Other, format!("{context}: {e}"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().map_err(|e| startup_error("invalid configuration", e))?;

    let store: Arc<dyn LedgerStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| startup_error("invalid configuration", "DATABASE_URL must be set"))?;
            let store = PgLedgerStore::connect(url)
                .await
                .map_err(|e| startup_error("failed to connect to DB", e))?;
            store
                .migrate()
                .await
                .map_err(|e| startup_error("failed to run migrations", e))?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            log::warn!("running with the in-memory store; nothing is persisted");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let payments: Arc<dyn PaymentProcessor> = Arc::new(
        StripeClient::new(
            config.stripe_api_key.clone(),
            config.stripe_api_base.clone(),
            config.currency.clone(),
            config.top_up_success_url.clone(),
            config.top_up_cancel_url.clone(),
            config.payouts.timeout,
        )
        .map_err(|e| startup_error("failed to build payment client", e))?,
    );

    let app_state = AppState::new(
        store,
        payments,
        config.payouts.clone(),
        &config.stripe_webhook_secret,
        config.webhook_tolerance,
        &config.jwt_secret,
    );

    reconcile::spawn(
        app_state.clone(),
        config.payouts.clone(),
        config.reconcile_interval,
        config.reconcile_batch_size,
    );

    let jwt_secret = config.jwt_secret.clone();
    let state = web::Data::new(app_state);

    log::info!("listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .configure(|cfg| api::configure(cfg, &jwt_secret))
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}
