use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use serde::Deserialize;
use std::future::{ready, Ready};

use crate::{config::Config, services::auth_service::verify_token, utils::error::AppError};

pub const TOKEN_COOKIE: &str = "token";

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Finds the JWT on a request: `Authorization: Bearer`, then the `token`
/// cookie, then a `token` query parameter (EventSource cannot set headers).
pub fn extract_token(req: &ServiceRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    bearer
        .or_else(|| req.cookie(TOKEN_COOKIE).map(|c| c.value().to_string()))
        .or_else(|| {
            web::Query::<TokenQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().token)
        })
        .filter(|t| !t.is_empty())
}

/// Verifies the JWT and stores its `Claims` in the request extensions.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(config) = req.app_data::<web::Data<Config>>().cloned() else {
            log::error!("❌ Auth middleware mounted without Config app data");
            let err = AppError::Internal("missing config".into());
            return Box::pin(async move { Err(err.into()) });
        };

        let Some(token) = extract_token(&req) else {
            log::warn!("🔒 No token on {} {}", req.method(), req.path());
            return Box::pin(async move {
                Err(AppError::unauthorized("Not authorized to access this route").into())
            });
        };

        match verify_token(&config, &token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(e) => {
                log::warn!("🔒 Rejected token on {}: {}", req.path(), e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}
