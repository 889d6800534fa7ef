use actix_web::{web, HttpResponse};

use crate::{
    api::failure,
    database::MongoDB,
    realtime::EventHub,
    services::{
        auth_service::Claims,
        parse_object_id,
        social_service::{self, FriendIdRequest, RequestIdRequest, UsernameRequest},
    },
};

pub async fn list(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = match claims.user_id() {
        Ok(id) => social_service::list_friends(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(friends) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "friends": friends
        })),
        Err(e) => failure("Friend list", e),
    }
}

pub async fn send_request(
    db: web::Data<MongoDB>,
    hub: web::Data<EventHub>,
    claims: web::ReqData<Claims>,
    request: web::Json<UsernameRequest>,
) -> HttpResponse {
    log::info!("🤝 {} -> friend request -> {}", claims.username, request.username);

    let result = match claims.user_id() {
        Ok(id) => social_service::send_friend_request(&db, &hub, &id, &request.username).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Friend request sent"
        })),
        Err(e) => failure("Friend request", e),
    }
}

pub async fn accept(
    db: web::Data<MongoDB>,
    hub: web::Data<EventHub>,
    claims: web::ReqData<Claims>,
    request: web::Json<RequestIdRequest>,
) -> HttpResponse {
    let result = async {
        let user_id = claims.user_id()?;
        let request_id = parse_object_id(&request.request_id, "request")?;
        social_service::accept_friend_request(&db, &hub, &user_id, &request_id).await
    }
    .await;

    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Friend request accepted"
        })),
        Err(e) => failure("Accept friend request", e),
    }
}

pub async fn reject(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<RequestIdRequest>,
) -> HttpResponse {
    let result = async {
        let user_id = claims.user_id()?;
        let request_id = parse_object_id(&request.request_id, "request")?;
        social_service::reject_friend_request(&db, &user_id, &request_id).await
    }
    .await;

    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Friend request rejected"
        })),
        Err(e) => failure("Reject friend request", e),
    }
}

pub async fn pending(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = match claims.user_id() {
        Ok(id) => social_service::pending_requests(&db, &id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(requests) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "requests": requests
        })),
        Err(e) => failure("Pending friend requests", e),
    }
}

pub async fn remove(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<FriendIdRequest>,
) -> HttpResponse {
    let result = async {
        let user_id = claims.user_id()?;
        let friend_id = parse_object_id(&request.friend_id, "friend")?;
        social_service::remove_friend(&db, &user_id, &friend_id).await
    }
    .await;

    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Friend removed"
        })),
        Err(e) => failure("Remove friend", e),
    }
}
