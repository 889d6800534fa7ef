use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::{
    api::failure,
    database::MongoDB,
    services::leaderboard_service::{self, clamp_limit, LeaderboardCategory},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
    pub time_frame: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/leaderboard/{category}",
    tag = "Player",
    params(
        ("category" = String, Path, description = "playtime, economy, mcmmo, kills, mining or achievements"),
        ("limit" = Option<i64>, Query, description = "Rows to return, default 10, max 100")
    ),
    responses(
        (status = 200, description = "Ranked players"),
        (status = 400, description = "Unknown category")
    )
)]
pub async fn get_leaderboard(
    db: web::Data<MongoDB>,
    category: web::Path<String>,
    query: web::Query<LeaderboardQuery>,
) -> HttpResponse {
    log::info!("🏆 GET /leaderboard/{}", category);

    let category = match category.parse::<LeaderboardCategory>() {
        Ok(category) => category,
        Err(e) => return failure("Leaderboard", e),
    };
    let limit = clamp_limit(query.limit);
    let time_frame = query.time_frame.clone().unwrap_or_else(|| "all".to_string());

    match leaderboard_service::leaderboard(&db, category, limit).await {
        Ok(players) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {
                "players": players,
                "category": category,
                "timeFrame": time_frame,
            }
        })),
        Err(e) => failure("Leaderboard", e),
    }
}
