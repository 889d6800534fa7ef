use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::{database::MongoDB, realtime::EventHub};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub sse_clients: usize,
    pub sse_users: usize,
    pub timestamp: i64,
}

/// API banner with the main route groups.
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "app": "BizzyLink API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "🟢 Healthy",
        "endpoints": [
            { "path": "/api/auth", "desc": "🔑 Auth" },
            { "path": "/api/linkcode", "desc": "🔗 Account linking" },
            { "path": "/api/minecraft", "desc": "⛏️ Minecraft integration" },
            { "path": "/api/player", "desc": "📊 Player stats" },
            { "path": "/api/events", "desc": "📡 Live events (SSE)" },
            { "path": "/api/notifications", "desc": "🔔 Notifications" },
            { "path": "/api/friends", "desc": "🤝 Friends" },
            { "path": "/api/following", "desc": "👣 Following" },
            { "path": "/api/leaderboard", "desc": "🏆 Leaderboards" },
            { "path": "/api/forum", "desc": "💬 Forum" },
            { "path": "/swagger-ui/", "desc": "📚 API docs" }
        ]
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(db: web::Data<MongoDB>, hub: web::Data<EventHub>) -> impl Responder {
    let database_ok = match db.ping().await {
        Ok(()) => true,
        Err(e) => {
            log::error!("❌ Health check: database ping failed: {}", e);
            false
        }
    };

    let body = HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" }.to_string(),
        service: "bizzylink".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "connected" } else { "unreachable" }.to_string(),
        sse_clients: hub.client_count(),
        sse_users: hub.user_count(),
        timestamp: chrono::Utc::now().timestamp(),
    };

    if database_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn banner_lists_endpoints() {
        let app = test::init_service(App::new().route("/", web::get().to(index))).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["app"], "BizzyLink API");
        assert!(body["endpoints"].as_array().unwrap().len() > 5);
    }
}
