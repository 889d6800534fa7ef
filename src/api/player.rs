use actix_web::{web, HttpRequest, HttpResponse};

use crate::{
    api::failure,
    config::Config,
    database::MongoDB,
    realtime::EventHub,
    services::player_service::{self, PlayerUpdateRequest},
    utils::server_key::require_server_key,
};

#[utoipa::path(
    get,
    path = "/api/player/{identifier}",
    tag = "Player",
    params(("identifier" = String, Path, description = "Minecraft UUID, Minecraft name or website username")),
    responses(
        (status = 200, description = "Player stats with defaults filled in"),
        (status = 404, description = "Player not found or not linked")
    )
)]
pub async fn get_player(db: web::Data<MongoDB>, identifier: web::Path<String>) -> HttpResponse {
    log::info!("🎮 GET /player/{}", identifier);

    match player_service::get_player(&db, &identifier).await {
        Ok(player) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": player
        })),
        Err(e) => failure("Player lookup", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/player/update",
    tag = "Player",
    request_body = PlayerUpdateRequest,
    responses(
        (status = 200, description = "Stats replaced"),
        (status = 400, description = "Missing UUID/data or player not linked"),
        (status = 401, description = "Missing or wrong server key"),
        (status = 404, description = "Player not found")
    )
)]
pub async fn update_player(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    hub: web::Data<EventHub>,
    request: web::Json<PlayerUpdateRequest>,
    req: HttpRequest,
) -> HttpResponse {
    log::info!(
        "📊 POST /player/update - uuid: {}",
        request.mc_uuid.as_deref().unwrap_or("N/A")
    );

    if let Err(e) = require_server_key(&config, &req, request.server_key.as_deref()) {
        return failure("Player update", e);
    }

    match player_service::update_stats(&db, &hub, request.into_inner()).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Player data updated successfully"
        })),
        Err(e) => failure("Player update", e),
    }
}
