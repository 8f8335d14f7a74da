// src/api/admin.rs
//
// Moderation and payout triggers. Every route requires the admin role.

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::approval::Outcome;
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectBody {
    pub reason: Option<String>,
}

fn outcome_response<T: Serialize>(outcome: Outcome<T>) -> HttpResponse {
    let label = outcome.label();
    HttpResponse::Ok().json(json!({
        "outcome": label,
        "record": outcome.into_inner(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/declarations/{id}/approve",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Declaration id")),
    responses(
        (status = 200, description = "outcome: applied | already_processed"),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "Transition not allowed")
    )
)]
#[post("/admin/declarations/{id}/approve")]
pub async fn approve(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    if let Some(forbidden) = user.forbid_unless_admin() {
        return Ok(forbidden);
    }
    let outcome = state.approvals.approve(path.into_inner()).await?;
    Ok(outcome_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/admin/declarations/{id}/reject",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Declaration id")),
    request_body = RejectBody,
    responses(
        (status = 200, description = "outcome: applied | already_processed"),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "Transition not allowed")
    )
)]
#[post("/admin/declarations/{id}/reject")]
pub async fn reject(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<Uuid>,
    payload: Option<web::Json<RejectBody>>,
) -> Result<HttpResponse> {
    if let Some(forbidden) = user.forbid_unless_admin() {
        return Ok(forbidden);
    }
    let reason = payload.and_then(|p| p.into_inner().reason);
    let outcome = state
        .approvals
        .reject(path.into_inner(), reason.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/admin/declarations/{id}/pay",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Declaration id")),
    responses(
        (status = 200, description = "outcome: applied | already_processed | in_progress"),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "Declaration is not approved"),
        (status = 502, description = "Payment processor failed")
    )
)]
#[post("/admin/declarations/{id}/pay")]
pub async fn pay(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    if let Some(forbidden) = user.forbid_unless_admin() {
        return Ok(forbidden);
    }
    let outcome = state.approvals.pay(path.into_inner()).await?;
    Ok(outcome_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/admin/withdrawals/{id}/process",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Withdrawal id")),
    responses(
        (status = 200, description = "outcome: applied | already_processed | in_progress"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Unknown withdrawal"),
        (status = 502, description = "Payment processor failed")
    )
)]
#[post("/admin/withdrawals/{id}/process")]
pub async fn process_withdrawal(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    if let Some(forbidden) = user.forbid_unless_admin() {
        return Ok(forbidden);
    }
    let outcome = state.withdrawals.process_withdrawal(path.into_inner()).await?;
    Ok(outcome_response(outcome))
}
