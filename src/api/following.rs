use actix_web::{web, HttpResponse};

use crate::{
    api::failure,
    database::MongoDB,
    realtime::EventHub,
    services::{
        auth_service::Claims,
        social_service::{self, UsernameRequest},
    },
};

pub async fn following(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = match claims.user_id() {
        Ok(id) => social_service::list_following(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(users) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "following": users
        })),
        Err(e) => failure("Following list", e),
    }
}

pub async fn followers(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = match claims.user_id() {
        Ok(id) => social_service::list_followers(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(users) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "followers": users
        })),
        Err(e) => failure("Follower list", e),
    }
}

pub async fn follow(
    db: web::Data<MongoDB>,
    hub: web::Data<EventHub>,
    claims: web::ReqData<Claims>,
    request: web::Json<UsernameRequest>,
) -> HttpResponse {
    log::info!("👣 {} follows {}", claims.username, request.username);

    let result = match claims.user_id() {
        Ok(id) => social_service::follow(&db, &hub, &id, &request.username).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(message) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": message
        })),
        Err(e) => failure("Follow", e),
    }
}

pub async fn unfollow(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UsernameRequest>,
) -> HttpResponse {
    log::info!("👣 {} unfollows {}", claims.username, request.username);

    let result = match claims.user_id() {
        Ok(id) => social_service::unfollow(&db, &id, &request.username).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(message) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": message
        })),
        Err(e) => failure("Unfollow", e),
    }
}
