// src/api/top_ups.rs

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::auth::AuthUser;
use crate::billing::validate_amount;
use crate::error::{LedgerError, Result};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TopUpBody {
    /// Minor units.
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopUpResponse {
    pub session_id: String,
    pub session_url: String,
}

/// Creates a hosted checkout session. The wallet is credited later, by the
/// provider's webhook, never by this call.
#[utoipa::path(
    post,
    path = "/api/top-ups",
    tag = "wallet",
    request_body = TopUpBody,
    responses(
        (status = 200, body = TopUpResponse),
        (status = 400, description = "Invalid amount"),
        (status = 502, description = "Payment processor failed")
    )
)]
#[post("/top-ups")]
pub async fn create_top_up(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<TopUpBody>,
) -> Result<HttpResponse> {
    validate_amount(payload.amount)?;

    log::info!(
        "top-up session create user_id={} amount={}",
        user.id,
        payload.amount
    );
    let session = state
        .payments
        .create_top_up_session(payload.amount, user.id)
        .await
        .map_err(|e| {
            log::error!("top-up session create error: {} user_id={}", e, user.id);
            LedgerError::ExternalService {
                message: format!("top-up session create failed: {e}"),
                retryable: !e.is_definite(),
            }
        })?;

    Ok(HttpResponse::Ok().json(TopUpResponse {
        session_id: session.id,
        session_url: session.url,
    }))
}
