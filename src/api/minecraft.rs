use actix_web::{web, HttpRequest, HttpResponse};

use crate::{
    api::failure,
    config::Config,
    database::MongoDB,
    realtime::EventHub,
    services::{
        auth_service::Claims,
        link_service::{self, LinkStatus, PluginUnlinkRequest},
        player_service::{self, NotifyRequest},
        security_log_service::ClientInfo,
    },
    utils::server_key::require_server_key,
};

#[utoipa::path(
    get,
    path = "/api/minecraft/link",
    tag = "Link",
    responses((status = 200, description = "Link status of the current user", body = LinkStatus)),
    security(("bearer_auth" = []))
)]
pub async fn link_status(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🔗 GET /minecraft/link - {}", claims.username);

    let result = match claims.user_id() {
        Ok(id) => link_service::link_status(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(status) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "status": status
        })),
        Err(e) => failure("Link status", e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/minecraft/link",
    tag = "Link",
    responses(
        (status = 200, description = "Account unlinked"),
        (status = 400, description = "Nothing linked")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unlink(
    db: web::Data<MongoDB>,
    hub: web::Data<EventHub>,
    claims: web::ReqData<Claims>,
    req: HttpRequest,
) -> HttpResponse {
    log::info!("🔓 DELETE /minecraft/link - {}", claims.username);
    let client = ClientInfo::from_request(&req);

    let result = match claims.user_id() {
        Ok(id) => link_service::unlink_user(&db, &hub, &id, &client).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Minecraft account unlinked successfully"
        })),
        Err(e) => failure("Unlink", e),
    }
}

pub async fn plugin_unlink(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    hub: web::Data<EventHub>,
    request: web::Json<PluginUnlinkRequest>,
    req: HttpRequest,
) -> HttpResponse {
    log::info!("🎮 POST /minecraft/unlink - uuid: {}", request.uuid);

    if let Err(e) = require_server_key(&config, &req, request.server_key.as_deref()) {
        return failure("Plugin unlink", e);
    }

    let client = ClientInfo::from_request(&req);
    match link_service::unlink_by_uuid(&db, &hub, &request.uuid, &client).await {
        Ok(username) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": format!("Minecraft account unlinked successfully for {}", username)
        })),
        Err(e) => failure("Plugin unlink", e),
    }
}

pub async fn player_status(db: web::Data<MongoDB>, identifier: web::Path<String>) -> HttpResponse {
    log::debug!("🎮 GET /minecraft/player/status/{}", identifier);

    match player_service::player_status(&db, &identifier).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => failure("Player status", e),
    }
}

pub async fn notify(
    config: web::Data<Config>,
    hub: web::Data<EventHub>,
    request: web::Json<NotifyRequest>,
    req: HttpRequest,
) -> HttpResponse {
    if let Err(e) = require_server_key(&config, &req, request.server_key.as_deref()) {
        return failure("Plugin notify", e);
    }

    match player_service::forward_event(&hub, request.into_inner()) {
        Ok(delivered) => {
            log::info!("📣 Plugin event forwarded to {} client(s)", delivered);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "delivered": delivered
            }))
        }
        Err(e) => failure("Plugin notify", e),
    }
}
