// src/api/auth.rs
//
// Identity is issued elsewhere; this service only validates bearer tokens.

use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, HttpResponse};
use chrono::{Duration, Utc};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Clipper,
    Streamer,
    Admin,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// The caller, as established by [`JwtMiddleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// `Some(403 response)` unless the caller is an admin.
    pub fn forbid_unless_admin(&self) -> Option<HttpResponse> {
        if self.is_admin() {
            None
        } else {
            Some(HttpResponse::Forbidden().json(serde_json::json!({
                "error": "admin role required",
                "kind": "forbidden",
                "retry": false
            })))
        }
    }
}

pub fn encode_token(
    secret: &str,
    user_id: Uuid,
    role: Role,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + ttl).timestamp().max(0) as usize;
    let claims = Claims {
        sub: user_id,
        role,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn decode_token(secret: &str, token: &str) -> Result<AuthUser, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(AuthUser {
        id: data.claims.sub,
        role: data.claims.role,
    })
}

/// Middleware that:
/// - takes `Authorization: Bearer <jwt>`
/// - validates the JWT against the configured secret
/// - puts an [`AuthUser`] into `req.extensions_mut()`
pub struct JwtMiddleware {
    secret: Rc<str>,
}

impl JwtMiddleware {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Rc::from(secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareInner {
            service,
            secret: self.secret.clone(),
        }))
    }
}

pub struct JwtMiddlewareInner<S> {
    service: S,
    secret: Rc<str>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let auth_header = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");

        let Some(token) = auth_header.strip_prefix("Bearer ") else {
            return Box::pin(async move {
                Err(LedgerError::Unauthorized(
                    "missing or invalid Authorization header".to_string(),
                )
                .into())
            });
        };

        match decode_token(&self.secret, token) {
            Ok(user) => {
                req.extensions_mut().insert(user);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(e) => {
                log::debug!("rejected bearer token: {}", e);
                Box::pin(async move {
                    Err(LedgerError::Unauthorized("invalid token".to_string()).into())
                })
            }
        }
    }
}
