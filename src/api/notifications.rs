use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::{
    api::failure,
    database::MongoDB,
    services::{auth_service::Claims, notification_service, parse_object_id},
    utils::error::AppError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub notification_id: String,
}

pub async fn list(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::debug!("🔔 GET /notifications - {}", claims.username);

    let result = match claims.user_id() {
        Ok(id) => notification_service::list(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(notifications) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "notifications": notifications
        })),
        Err(e) => failure("Notification list", e),
    }
}

async fn mark_one(db: &MongoDB, claims: &Claims, raw_id: &str) -> Result<(), AppError> {
    let user_id = claims.user_id()?;
    let notification_id = parse_object_id(raw_id, "notification")?;
    notification_service::mark_read(db, &user_id, &notification_id).await
}

pub async fn mark_read(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<MarkReadRequest>,
) -> HttpResponse {
    match mark_one(&db, &claims, &request.notification_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Notification marked as read"
        })),
        Err(e) => failure("Mark notification read", e),
    }
}

pub async fn mark_all_read(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = match claims.user_id() {
        Ok(id) => notification_service::mark_all_read(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(count) => {
            log::info!("🔔 {} marked {} notification(s) read", claims.username, count);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "All notifications marked as read"
            }))
        }
        Err(e) => failure("Mark all notifications read", e),
    }
}

pub async fn delete(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let result = async {
        let user_id = claims.user_id()?;
        let notification_id = parse_object_id(&path, "notification")?;
        notification_service::delete(&db, &user_id, &notification_id).await
    }
    .await;

    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Notification deleted"
        })),
        Err(e) => failure("Delete notification", e),
    }
}
