use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BizzyLink API",
        version = "1.0.0",
        description = "Links website accounts to Minecraft players and streams live account events.\n\n**Authentication:** user endpoints take a JWT Bearer token; plugin endpoints take the server key in `serverKey` or `X-Server-Key`."
    ),
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::auth::logout,
        crate::api::auth::get_me,
        crate::api::linkcode::generate,
        crate::api::linkcode::get_active,
        crate::api::linkcode::validate,
        crate::api::minecraft::link_status,
        crate::api::minecraft::unlink,
        crate::api::player::get_player,
        crate::api::player::update_player,
        crate::api::leaderboard::get_leaderboard,
        crate::api::health::health_check,
    ),
    components(
        schemas(
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::AuthResponse,
            crate::models::UserInfo,
            crate::models::MinecraftInfo,
            crate::models::WebRank,
            crate::services::link_service::LinkCodeInfo,
            crate::services::link_service::ValidateLinkRequest,
            crate::services::link_service::LinkResult,
            crate::services::link_service::LinkStatus,
            crate::services::player_service::PlayerUpdateRequest,
            crate::api::health::HealthResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login and the current user."),
        (name = "Link", description = "Link codes and the Minecraft account link."),
        (name = "Player", description = "Player stats pushed by the plugin, and leaderboards."),
        (name = "Health", description = "Service and database health."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Enter your JWT token"))
                        .build(),
                ),
            );
        }
    }
}
