// src/api/webhooks.rs

use actix_web::web::Bytes;
use actix_web::{post, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::api::stripe::SIGNATURE_HEADER;
use crate::error::LedgerError;
use crate::AppState;

/// Provider notifications. The body is read raw because the signature covers
/// the exact bytes.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "webhooks",
    request_body(content = String, description = "Raw provider event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event handled, duplicate or ignored"),
        (status = 400, description = "Signature missing or invalid"),
        (status = 500, description = "Store failure; provider should redeliver")
    )
)]
#[post("/webhook")]
pub async fn payment_webhook(
    req: HttpRequest,
    body: Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match state.webhooks.handle_event(&body, signature).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "ok": true,
            "outcome": outcome.label(),
        })),
        Err(LedgerError::Authenticity(reason)) => {
            log::warn!("webhook rejected: {}", reason);
            HttpResponse::BadRequest().json(json!({
                "ok": false,
                "error": "invalid signature",
            }))
        }
        Err(e) => {
            log::error!("webhook processing error: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "ok": false,
                "error": "processing failed",
            }))
        }
    }
}
