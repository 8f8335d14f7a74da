// src/api/declarations.rs

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::auth::{AuthUser, Role};
use crate::error::{LedgerError, Result};
use crate::reconciler::DeclareViews;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeclareViewsBody {
    pub clip_url: String,
    /// Cumulative views of the clip so far.
    pub declared_views: i64,
    /// Minor units per thousand views.
    pub rate_cpm: i64,
    pub verification_code: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClipQuery {
    pub clip_url: String,
}

/// Clippers only see their own declarations; streamers and admins see all.
fn can_view(user: &AuthUser, clipper_id: Uuid) -> bool {
    user.role != Role::Clipper || user.id == clipper_id
}

#[utoipa::path(
    post,
    path = "/api/declarations",
    tag = "declarations",
    request_body = DeclareViewsBody,
    responses(
        (status = 200, description = "Declaration created or updated", body = Declaration),
        (status = 400, description = "Invalid input or already paid"),
        (status = 409, description = "Payout in progress")
    )
)]
#[post("/declarations")]
pub async fn declare_views(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<DeclareViewsBody>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    let declaration = state
        .reconciler
        .declare_views(DeclareViews {
            clipper_id: user.id,
            clip_url: payload.clip_url,
            declared_views: payload.declared_views,
            rate_cpm: payload.rate_cpm,
            verification_code: payload.verification_code,
        })
        .await?;
    Ok(HttpResponse::Ok().json(declaration))
}

#[utoipa::path(
    get,
    path = "/api/declarations/{id}",
    tag = "declarations",
    params(("id" = Uuid, Path, description = "Declaration id")),
    responses(
        (status = 200, body = Declaration),
        (status = 404, description = "Unknown declaration")
    )
)]
#[get("/declarations/{id}")]
pub async fn get_declaration(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let declaration = state.reconciler.declaration(path.into_inner()).await?;
    if !can_view(&user, declaration.clipper_id) {
        return Err(LedgerError::not_found("declaration", declaration.id));
    }
    Ok(HttpResponse::Ok().json(declaration))
}

#[utoipa::path(
    get,
    path = "/api/clippers/{clipper_id}/declarations",
    tag = "declarations",
    params(("clipper_id" = Uuid, Path, description = "Clipper id")),
    responses((status = 200, body = [Declaration]))
)]
#[get("/clippers/{clipper_id}/declarations")]
pub async fn list_for_clipper(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let clipper_id = path.into_inner();
    if !can_view(&user, clipper_id) {
        return Err(LedgerError::not_found("clipper", clipper_id));
    }
    let declarations = state.reconciler.declarations_for_clipper(clipper_id).await?;
    Ok(HttpResponse::Ok().json(declarations))
}

#[utoipa::path(
    get,
    path = "/api/declarations",
    tag = "declarations",
    params(ClipQuery),
    responses((status = 200, body = [Declaration]))
)]
#[get("/declarations")]
pub async fn list_for_clip(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    query: web::Query<ClipQuery>,
) -> Result<HttpResponse> {
    let mut declarations = state.reconciler.declarations_for_clip(&query.clip_url).await?;
    declarations.retain(|d| can_view(&user, d.clipper_id));
    Ok(HttpResponse::Ok().json(declarations))
}
