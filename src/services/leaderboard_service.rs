use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use serde::Serialize;
use serde_json::Value;

use crate::{
    database::{MongoDB, USERS},
    utils::{
        error::AppError,
        time::{chrono_from_bson, format_last_seen},
    },
};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardCategory {
    Playtime,
    Economy,
    Mcmmo,
    Kills,
    Mining,
    Achievements,
}

impl LeaderboardCategory {
    pub const ALL: [LeaderboardCategory; 6] = [
        LeaderboardCategory::Playtime,
        LeaderboardCategory::Economy,
        LeaderboardCategory::Mcmmo,
        LeaderboardCategory::Kills,
        LeaderboardCategory::Mining,
        LeaderboardCategory::Achievements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardCategory::Playtime => "playtime",
            LeaderboardCategory::Economy => "economy",
            LeaderboardCategory::Mcmmo => "mcmmo",
            LeaderboardCategory::Kills => "kills",
            LeaderboardCategory::Mining => "mining",
            LeaderboardCategory::Achievements => "achievements",
        }
    }

    /// Field the players are ranked by, descending.
    fn sort_key(&self) -> &'static str {
        match self {
            LeaderboardCategory::Playtime => "playtime_minutes",
            LeaderboardCategory::Economy => "balance",
            LeaderboardCategory::Mcmmo => "mcmmo_power_level",
            LeaderboardCategory::Kills => "mobs_killed",
            LeaderboardCategory::Mining => "blocks_mined",
            LeaderboardCategory::Achievements => "achievements",
        }
    }

    /// Category-specific output fields, each read from `minecraft.stats`.
    fn stat_fields(&self) -> Document {
        match self {
            LeaderboardCategory::Playtime => doc! {
                "playtime_minutes": stat("playtime_minutes", 0),
                "playtime": stat("playtime", "0m"),
                "balance": stat("balance", 0),
                "level": stat("level", 1),
                "experience": stat("experience", 0),
                "blocks_mined": stat("blocks_mined", 0),
                "mobs_killed": stat("mobs_killed", 0),
                "deaths": stat("deaths", 0),
                "world": stat("world", "world"),
                "gamemode": stat("gamemode", "SURVIVAL"),
                "achievements": stat("achievements", 0),
                "advancements": { "$size": { "$ifNull": ["$minecraft.stats.advancements", []] } },
            },
            LeaderboardCategory::Economy => doc! {
                "balance": stat("balance", 0),
                "money_earned": stat("money_earned", 0),
                "money_earned_today": stat("money_earned_today", 0),
                "money_spent": stat("money_spent", 0),
            },
            LeaderboardCategory::Mcmmo => doc! {
                "mcmmo_power_level": stat("mcmmo_power_level", 0),
                "skills": { "$ifNull": ["$minecraft.stats.mcmmo_data.skills", {}] },
            },
            LeaderboardCategory::Kills => doc! {
                "mobs_killed": stat("mobs_killed", 0),
                "player_kills": stat("player_kills", 0),
                "deaths": stat("deaths", 0),
                "kdr": {
                    "$cond": [
                        { "$gt": [stat("deaths", 0), 0] },
                        { "$divide": [stat("mobs_killed", 0), stat("deaths", 1)] },
                        stat("mobs_killed", 0),
                    ]
                },
            },
            LeaderboardCategory::Mining => doc! {
                "blocks_mined": stat("blocks_mined", 0),
                "ores_mined": stat("ores_mined", 0),
                "diamonds_mined": stat("diamonds_mined", 0),
            },
            LeaderboardCategory::Achievements => doc! {
                "achievements": stat("achievements", 0),
                "advancements_completed": stat("advancements_completed", 0),
            },
        }
    }
}

impl fmt::Display for LeaderboardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeaderboardCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = LeaderboardCategory::ALL.iter().map(|c| c.as_str()).collect();
                AppError::invalid(format!(
                    "Invalid category. Valid options are: {}",
                    valid.join(", ")
                ))
            })
    }
}

fn stat(name: &str, default: impl Into<Bson>) -> Document {
    doc! { "$ifNull": [format!("$minecraft.stats.{}", name), default.into()] }
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// Linked players only, ranked by the category's key.
pub fn build_pipeline(category: LeaderboardCategory, limit: i64) -> Vec<Document> {
    let mut projection = doc! {
        "_id": 0,
        "id": { "$toString": "$_id" },
        "username": 1,
        "mcUsername": "$minecraft.mcUsername",
        "uuid": "$minecraft.mcUUID",
        "rank": stat("rank", "Member"),
        "lastSeenRaw": { "$ifNull": ["$minecraft.stats.lastSeen", "$minecraft.lastUpdated"] },
    };
    projection.extend(category.stat_fields());

    let mut sort = Document::new();
    sort.insert(category.sort_key(), -1);
    sort.insert("username", 1);

    vec![
        doc! { "$match": { "$and": [
            { "minecraft.linked": true },
            { "minecraft.mcUsername": { "$exists": true, "$ne": null } },
            { "minecraft.mcUUID": { "$exists": true, "$ne": null } },
        ] } },
        doc! { "$project": projection },
        doc! { "$sort": sort },
        doc! { "$limit": limit },
    ]
}

fn parse_last_seen(raw: Option<&Bson>) -> Option<DateTime<Utc>> {
    match raw? {
        Bson::DateTime(at) => Some(chrono_from_bson(*at)),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        Bson::Int64(ms) => DateTime::from_timestamp_millis(*ms),
        Bson::Double(ms) => DateTime::from_timestamp_millis(*ms as i64),
        _ => None,
    }
}

/// Replaces `lastSeenRaw` with a human `lastSeen` label.
pub fn finish_row(mut row: Document, now: DateTime<Utc>) -> Value {
    let raw = row.remove("lastSeenRaw");
    row.insert("lastSeen", format_last_seen(parse_last_seen(raw.as_ref()), now));
    Bson::Document(row).into_relaxed_extjson()
}

pub async fn leaderboard(
    db: &MongoDB,
    category: LeaderboardCategory,
    limit: i64,
) -> Result<Vec<Value>, AppError> {
    let rows: Vec<Document> = db
        .collection::<Document>(USERS)
        .aggregate(build_pipeline(category, limit))
        .await?
        .try_collect()
        .await?;

    let now = Utc::now();
    Ok(rows.into_iter().map(|row| finish_row(row, now)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    #[rstest]
    #[case("playtime", LeaderboardCategory::Playtime)]
    #[case("economy", LeaderboardCategory::Economy)]
    #[case("mcmmo", LeaderboardCategory::Mcmmo)]
    #[case("kills", LeaderboardCategory::Kills)]
    #[case("mining", LeaderboardCategory::Mining)]
    #[case("achievements", LeaderboardCategory::Achievements)]
    fn parses_known_categories(#[case] raw: &str, #[case] expected: LeaderboardCategory) {
        assert_eq!(raw.parse::<LeaderboardCategory>().unwrap(), expected);
    }

    #[test]
    fn unknown_category_lists_options() {
        let err = "pvp".parse::<LeaderboardCategory>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid category. Valid options are: playtime, economy, mcmmo, kills, mining, achievements"
        );
    }

    #[rstest]
    #[case(None, 10)]
    #[case(Some(0), 10)]
    #[case(Some(-3), 10)]
    #[case(Some(25), 25)]
    #[case(Some(500), 100)]
    fn limit_is_clamped(#[case] raw: Option<i64>, #[case] expected: i64) {
        assert_eq!(clamp_limit(raw), expected);
    }

    #[test]
    fn pipeline_sorts_on_category_key_and_limits() {
        let pipeline = build_pipeline(LeaderboardCategory::Mining, 5);
        assert_eq!(pipeline.len(), 4);
        let sort = pipeline[2].get_document("$sort").unwrap();
        assert_eq!(sort.get_i32("blocks_mined").unwrap(), -1);
        assert_eq!(pipeline[3].get_i64("$limit").unwrap(), 5);

        let projection = pipeline[1].get_document("$project").unwrap();
        assert!(projection.contains_key("diamonds_mined"));
        assert!(!projection.contains_key("kdr"));
    }

    #[test]
    fn row_gets_formatted_last_seen() {
        let now = Utc::now();
        let seen = crate::utils::time::bson_from_chrono(now - Duration::hours(3));
        let row = doc! { "username": "steve", "lastSeenRaw": seen };

        let json = finish_row(row, now);
        assert_eq!(json["lastSeen"], "3h ago");
        assert!(json.get("lastSeenRaw").is_none());
    }

    #[test]
    fn unparseable_last_seen_is_unknown() {
        let row = doc! { "username": "alex", "lastSeenRaw": "N/A" };
        assert_eq!(finish_row(row, Utc::now())["lastSeen"], "Unknown");
    }
}
