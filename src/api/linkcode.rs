use actix_web::{web, HttpRequest, HttpResponse};

use crate::{
    api::failure,
    config::Config,
    database::MongoDB,
    realtime::EventHub,
    services::{
        auth_service::Claims,
        link_service::{self, LinkCodeInfo, LinkResult, ValidateLinkRequest},
        security_log_service::ClientInfo,
    },
    utils::{error::AppError, server_key::require_server_key},
};

#[utoipa::path(
    post,
    path = "/api/linkcode/generate",
    tag = "Link",
    responses(
        (status = 201, description = "New code issued", body = LinkCodeInfo),
        (status = 200, description = "Existing unexpired code returned", body = LinkCodeInfo),
        (status = 400, description = "Account already linked")
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
) -> HttpResponse {
    log::info!("🔑 POST /linkcode/generate - {}", claims.username);

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(e) => return failure("Link code generation", e),
    };

    match link_service::generate_code(&db, &config, &user_id).await {
        Ok((info, created)) => {
            let body = serde_json::json!({
                "success": true,
                "code": info.code,
                "expiresAt": info.expires_at,
                "expiresInSeconds": info.expires_in_seconds,
                "command": info.command,
                "message": format!("Type {} in Minecraft to link your account", info.command),
            });
            if created {
                HttpResponse::Created().json(body)
            } else {
                HttpResponse::Ok().json(body)
            }
        }
        Err(e) => failure("Link code generation", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/linkcode",
    tag = "Link",
    responses(
        (status = 200, description = "Active code", body = LinkCodeInfo),
        (status = 404, description = "No active code")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_active(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🔎 GET /linkcode - {}", claims.username);

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(e) => return failure("Link code lookup", e),
    };

    match link_service::get_active_code(&db, &user_id).await {
        Ok(Some(info)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "linkCode": info
        })),
        Ok(None) => failure("Link code lookup", AppError::not_found("No active link code")),
        Err(e) => failure("Link code lookup", e),
    }
}

/// Called by the Minecraft plugin when a player runs `/link <code>`.
#[utoipa::path(
    post,
    path = "/api/linkcode/validate",
    tag = "Link",
    request_body = ValidateLinkRequest,
    responses(
        (status = 200, description = "Account linked", body = LinkResult),
        (status = 400, description = "Expired code, bad UUID or UUID already linked"),
        (status = 401, description = "Missing or wrong server key"),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn validate(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    hub: web::Data<EventHub>,
    request: web::Json<ValidateLinkRequest>,
    req: HttpRequest,
) -> HttpResponse {
    log::info!(
        "🎮 POST /linkcode/validate - player: {} ({})",
        request.username,
        request.uuid
    );

    if let Err(e) = require_server_key(&config, &req, request.server_key.as_deref()) {
        return failure("Link validation", e);
    }

    let client = ClientInfo::from_request(&req);
    match link_service::validate_code(&db, &config, &hub, &request, &client).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => failure("Link validation", e),
    }
}
