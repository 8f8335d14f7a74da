pub mod admin;
pub mod auth;
pub mod declarations;
pub mod stripe;
pub mod stripe_client;
pub mod top_ups;
pub mod webhooks;
pub mod withdrawals;

use actix_web::web;

use crate::error::LedgerError;

/// Extractor failures answer with the same JSON body as any validation error.
fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|e, _req| LedgerError::Validation(e.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|e, _req| LedgerError::Validation(e.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|e, _req| LedgerError::Validation(e.to_string()).into()),
    );
}

/// Registers the public webhook and the JWT-protected `/api` scope.
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    extractor_errors(cfg);

    // Public
    cfg.service(webhooks::payment_webhook);

    // Protected
    cfg.service(
        web::scope("/api")
            .wrap(auth::JwtMiddleware::new(jwt_secret))
            .service(declarations::declare_views)
            .service(declarations::list_for_clip)
            .service(declarations::get_declaration)
            .service(declarations::list_for_clipper)
            .service(withdrawals::request_withdrawal)
            .service(withdrawals::list_withdrawals)
            .service(withdrawals::wallet)
            .service(top_ups::create_top_up)
            .service(admin::approve)
            .service(admin::reject)
            .service(admin::pay)
            .service(admin::process_withdrawal),
    );
}
