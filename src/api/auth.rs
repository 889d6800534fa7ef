use actix_web::{
    cookie::{time::Duration, Cookie, SameSite},
    web, HttpRequest, HttpResponse,
};

use crate::{
    api::failure,
    config::Config,
    database::MongoDB,
    middleware::auth::TOKEN_COOKIE,
    services::{
        auth_service::{self, AuthResponse, Claims, LoginRequest, RegisterRequest},
        security_log_service::ClientInfo,
    },
};

fn token_cookie(config: &Config, token: String) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::hours(config.jwt_expire_hours))
        .finish()
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Invalid input or username/email taken")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    request: web::Json<RegisterRequest>,
) -> HttpResponse {
    log::info!("📝 POST /auth/register - username: {}", request.username);

    match auth_service::register(&db, &config, &request).await {
        Ok(response) => {
            let cookie = token_cookie(&config, response.token.clone());
            HttpResponse::Created().cookie(cookie).json(response)
        }
        Err(e) => failure("Registration", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account locked after repeated failures")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    request: web::Json<LoginRequest>,
    req: HttpRequest,
) -> HttpResponse {
    log::info!("🔐 POST /auth/login - username: {}", request.username);
    let client = ClientInfo::from_request(&req);

    match auth_service::login(&db, &config, &request, &client).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", response.user.username);
            let cookie = token_cookie(&config, response.token.clone());
            HttpResponse::Ok().cookie(cookie).json(response)
        }
        Err(e) => failure("Login", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Cookie cleared")),
    security(("bearer_auth" = []))
)]
pub async fn logout(claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("👋 POST /auth/logout - {}", claims.username);

    let mut cookie = Cookie::build(TOKEN_COOKIE, "").path("/").finish();
    cookie.make_removal();

    HttpResponse::Ok().cookie(cookie).json(serde_json::json!({
        "success": true,
        "message": "Logged out successfully"
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("👤 GET /auth/me - {}", claims.username);

    match auth_service::get_current_user(&db, &claims).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user": user
        })),
        Err(e) => failure("Current user lookup", e),
    }
}
