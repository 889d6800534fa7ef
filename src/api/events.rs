use actix_web::{
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    web, HttpResponse,
};
use serde::Deserialize;

use crate::{
    api::failure,
    realtime::{EventHub, UserEvent},
    services::auth_service::Claims,
    utils::{error::AppError, time::now_millis},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub user_id: Option<String>,
}

/// Opens the caller's event stream. A `userId` other than the token's
/// subject is refused.
pub async fn stream(
    hub: web::Data<EventHub>,
    claims: web::ReqData<Claims>,
    query: web::Query<EventsQuery>,
) -> HttpResponse {
    if let Some(requested) = query.user_id.as_deref() {
        if requested != claims.sub {
            return failure(
                "Event stream",
                AppError::forbidden("Not authorized to subscribe to this user's events"),
            );
        }
    }

    let events = hub.subscribe(&claims.sub);
    log::info!(
        "📡 SSE client {} connected for {} ({} open)",
        events.client_id(),
        claims.username,
        hub.client_count()
    );

    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(events)
}

/// Pushes a `test` event to the caller's own streams.
pub async fn send_test(hub: web::Data<EventHub>, claims: web::ReqData<Claims>) -> HttpResponse {
    let event = UserEvent::new("test")
        .with("message", "Test event from server")
        .with("timestamp", now_millis());
    let delivered = hub.send_to_user(&claims.sub, &event);
    log::info!("🧪 Test event for {} reached {} client(s)", claims.username, delivered);

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "delivered": delivered
    }))
}
