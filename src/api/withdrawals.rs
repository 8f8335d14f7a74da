// src/api/withdrawals.rs

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::auth::AuthUser;
use crate::error::Result;
use crate::models::PayoutMethod;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawalBody {
    /// Minor units.
    pub amount: i64,
    pub method: PayoutMethod,
}

#[utoipa::path(
    post,
    path = "/api/withdrawals",
    tag = "wallet",
    request_body = WithdrawalBody,
    responses(
        (status = 200, description = "Withdrawal requested, funds held", body = Withdrawal),
        (status = 400, description = "Invalid amount, no payout account or insufficient balance")
    )
)]
#[post("/withdrawals")]
pub async fn request_withdrawal(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<WithdrawalBody>,
) -> Result<HttpResponse> {
    let withdrawal = state
        .withdrawals
        .request_withdrawal(user.id, payload.amount, payload.method)
        .await?;
    Ok(HttpResponse::Ok().json(withdrawal))
}

#[utoipa::path(
    get,
    path = "/api/withdrawals",
    tag = "wallet",
    responses((status = 200, body = [Withdrawal]))
)]
#[get("/withdrawals")]
pub async fn list_withdrawals(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let withdrawals = state.withdrawals.withdrawals_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(withdrawals))
}

#[utoipa::path(
    get,
    path = "/api/wallet",
    tag = "wallet",
    responses((status = 200, body = Wallet))
)]
#[get("/wallet")]
pub async fn wallet(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let wallet = state.store.get_or_create_wallet(user.id).await?;
    Ok(HttpResponse::Ok().json(wallet))
}
