use actix_web::{web, HttpResponse};

use crate::{
    api::failure,
    database::MongoDB,
    realtime::EventHub,
    services::{
        auth_service::Claims,
        forum_service::{self, CreateCategoryRequest, CreatePostRequest, CreateThreadRequest, PageQuery},
        parse_object_id,
    },
};

pub async fn categories(db: web::Data<MongoDB>) -> HttpResponse {
    match forum_service::list_categories(&db).await {
        Ok(categories) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": categories.len(),
            "data": categories
        })),
        Err(e) => failure("Forum categories", e),
    }
}

pub async fn category(db: web::Data<MongoDB>, slug: web::Path<String>) -> HttpResponse {
    match forum_service::category_with_threads(&db, &slug).await {
        Ok(page) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": page
        })),
        Err(e) => failure("Forum category", e),
    }
}

pub async fn thread(
    db: web::Data<MongoDB>,
    slug: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    match forum_service::thread_with_posts(&db, &slug, &query).await {
        Ok(page) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": page
        })),
        Err(e) => failure("Forum thread", e),
    }
}

pub async fn create_thread(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateThreadRequest>,
) -> HttpResponse {
    log::info!("🧵 POST /forum/thread - {} by {}", request.title, claims.username);

    let result = match claims.user_id() {
        Ok(id) => forum_service::create_thread(&db, &id, request.into_inner()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(thread) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "data": { "thread": thread }
        })),
        Err(e) => failure("Create thread", e),
    }
}

pub async fn create_post(
    db: web::Data<MongoDB>,
    hub: web::Data<EventHub>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreatePostRequest>,
) -> HttpResponse {
    let result = match claims.user_id() {
        Ok(id) => forum_service::create_post(&db, &hub, &id, request.into_inner()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(post) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "data": post
        })),
        Err(e) => failure("Create post", e),
    }
}

pub async fn like(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let result = async {
        let user_id = claims.user_id()?;
        let post_id = parse_object_id(&path, "post")?;
        forum_service::like_post(&db, &user_id, &post_id).await
    }
    .await;

    match result {
        Ok(likes) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": { "likes": likes }
        })),
        Err(e) => failure("Like post", e),
    }
}

pub async fn unlike(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let result = async {
        let user_id = claims.user_id()?;
        let post_id = parse_object_id(&path, "post")?;
        forum_service::unlike_post(&db, &user_id, &post_id).await
    }
    .await;

    match result {
        Ok(likes) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": { "likes": likes }
        })),
        Err(e) => failure("Unlike post", e),
    }
}

pub async fn create_category(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateCategoryRequest>,
) -> HttpResponse {
    log::info!("🗂️  POST /forum/admin/category - {} by {}", request.name, claims.username);

    let result = match claims.user_id() {
        Ok(id) => forum_service::create_category(&db, &id, request.into_inner()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(category) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "data": category
        })),
        Err(e) => failure("Create category", e),
    }
}
