use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bizzylink::{
    api,
    config::Config,
    database::MongoDB,
    jobs,
    middleware::{self, AuthMiddleware},
    realtime::EventHub,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("❌ Invalid configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    log::info!("🚀 Starting BizzyLink server...");

    let db = MongoDB::connect_with_retry(&config.mongo_uri, config.mongo_connect_attempts)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to MongoDB: {}", e)))?;
    log::info!("✅ MongoDB connected successfully");

    let hub = EventHub::new();

    log::info!("📅 Starting background jobs...");
    jobs::sse_heartbeat::start_sse_heartbeat(hub.clone(), config.sse_heartbeat);
    jobs::link_code_cleanup::start_link_code_cleanup(db.clone());

    let bind = (config.host.clone(), config.port);
    log::info!("🌐 Server starting on {}:{}", bind.0, bind.1);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", bind.0, bind.1);

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config);
    let hub_data = web::Data::new(hub);
    let openapi = api::swagger::ApiDoc::openapi();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config_data.cors_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::CACHE_CONTROL,
                header::HeaderName::from_static("x-server-key"),
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(hub_data.clone())
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(middleware::access_log())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
            .route("/", web::get().to(api::health::index))
            .route("/health", web::get().to(api::health::health_check))
            // Login is also served at the old path the plugin and web client use
            .route("/api/login", web::post().to(api::auth::login))
            .service(
                web::scope("/api/auth")
                    .route("/register", web::post().to(api::auth::register))
                    .route("/login", web::post().to(api::auth::login))
                    .service(
                        web::resource("/logout")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::auth::logout)),
                    )
                    .service(
                        web::resource("/me")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::auth::get_me)),
                    ),
            )
            // ==================== ACCOUNT LINKING ====================
            .service(
                web::scope("/api/linkcode")
                    .route("/validate", web::post().to(api::linkcode::validate))
                    .service(
                        web::resource("/generate")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::linkcode::generate)),
                    )
                    .service(
                        web::resource("")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::linkcode::get_active)),
                    ),
            )
            .service(
                web::scope("/api/minecraft")
                    .service(
                        web::resource("/link")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::minecraft::link_status))
                            .route(web::delete().to(api::minecraft::unlink)),
                    )
                    .route("/unlink", web::post().to(api::minecraft::plugin_unlink))
                    .route("/notify", web::post().to(api::minecraft::notify))
                    .route(
                        "/player/status/{identifier}",
                        web::get().to(api::minecraft::player_status),
                    ),
            )
            .service(
                web::scope("/api/player")
                    .route("/update", web::post().to(api::player::update_player))
                    .route("/{identifier}", web::get().to(api::player::get_player)),
            )
            // ==================== LIVE EVENTS ====================
            .service(
                web::scope("/api/events")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(api::events::stream))
                    .route("/test", web::post().to(api::events::send_test)),
            )
            // ==================== SOCIAL ====================
            .service(
                web::scope("/api/notifications")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(api::notifications::list))
                    .route("/read", web::post().to(api::notifications::mark_read))
                    .route("/read-all", web::post().to(api::notifications::mark_all_read))
                    .route("/{id}", web::delete().to(api::notifications::delete)),
            )
            .service(
                web::scope("/api/friends")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(api::friends::list))
                    .route("/request", web::post().to(api::friends::send_request))
                    .route("/accept", web::post().to(api::friends::accept))
                    .route("/reject", web::post().to(api::friends::reject))
                    .route("/requests", web::get().to(api::friends::pending))
                    .route("/remove", web::post().to(api::friends::remove)),
            )
            .service(
                web::scope("/api/following")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(api::following::following))
                    .route("/followers", web::get().to(api::following::followers))
                    .route("/follow", web::post().to(api::following::follow))
                    .route("/unfollow", web::post().to(api::following::unfollow)),
            )
            .route(
                "/api/leaderboard/{category}",
                web::get().to(api::leaderboard::get_leaderboard),
            )
            // ==================== FORUM ====================
            .service(
                web::scope("/api/forum")
                    .route("/categories", web::get().to(api::forum::categories))
                    .route("/category/{slug}", web::get().to(api::forum::category))
                    .route("/thread/{slug}", web::get().to(api::forum::thread))
                    .service(
                        web::resource("/thread")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::forum::create_thread)),
                    )
                    .service(
                        web::resource("/post")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::forum::create_post)),
                    )
                    .service(
                        web::resource("/post/{id}/like")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::forum::like)),
                    )
                    .service(
                        web::resource("/post/{id}/unlike")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::forum::unlike)),
                    )
                    .service(
                        web::resource("/admin/category")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::forum::create_category)),
                    ),
            )
    })
    .bind(bind)?
    .run()
    .await
}
