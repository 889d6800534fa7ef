use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    database::{MongoDB, USERS},
    models::User,
    realtime::{EventHub, UserEvent},
    utils::{
        error::AppError,
        link_code::{is_valid_minecraft_username, normalize_uuid},
        time::to_iso,
    },
};

/// Keys the plugin may not overwrite through a stats update.
pub const FORBIDDEN_STAT_KEYS: [&str; 6] = [
    "linked",
    "mcUsername",
    "mcUUID",
    "minecraftUUID",
    "minecraftUsername",
    "isLinked",
];

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateRequest {
    #[serde(rename = "mcUUID", alias = "uuid", default)]
    pub mc_uuid: Option<String>,
    #[serde(default)]
    pub server_key: Option<String>,
    #[serde(alias = "stats", default)]
    #[schema(value_type = Option<Object>)]
    pub player_data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub server_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub success: bool,
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

/// Anything with a dash, or 32/36 chars long, is looked up as a UUID.
pub fn is_uuid_identifier(identifier: &str) -> bool {
    identifier.contains('-') || identifier.len() == 32 || identifier.len() == 36
}

/// Drops identity keys from a plugin stats payload. Returns the removed keys.
pub fn sanitize_stats(stats: &mut Map<String, Value>) -> Vec<&'static str> {
    FORBIDDEN_STAT_KEYS
        .iter()
        .copied()
        .filter(|key| stats.remove(*key).is_some())
        .collect()
}

fn exact_name_regex(name: &str) -> Regex {
    let escaped: String = name
        .chars()
        .flat_map(|c| {
            let special = "\\^$.|?*+()[]{}".contains(c);
            special.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect();
    Regex {
        pattern: format!("^{}$", escaped),
        options: "i".to_string(),
    }
}

/// Finds the linked account for a UUID, Minecraft name or website username.
pub async fn find_player(db: &MongoDB, identifier: &str) -> Result<Option<User>, AppError> {
    let users = db.collection::<User>(USERS);
    let identifier = identifier.trim();

    if is_uuid_identifier(identifier) {
        let Some(uuid) = normalize_uuid(identifier) else {
            return Ok(None);
        };
        return Ok(users.find_one(doc! { "minecraft.mcUUID": uuid }).await?);
    }

    if let Some(user) = users
        .find_one(doc! { "minecraft.mcUsername": identifier })
        .await?
    {
        return Ok(Some(user));
    }

    if is_valid_minecraft_username(identifier) {
        if let Some(user) = users
            .find_one(doc! { "minecraft.mcUsername": exact_name_regex(identifier) })
            .await?
        {
            return Ok(Some(user));
        }
    }

    let website_user = users.find_one(doc! { "username": identifier }).await?;
    Ok(website_user.filter(|u| u.minecraft.mc_username.is_some()))
}

fn document_to_json(document: &Document) -> Map<String, Value> {
    match Bson::Document(document.clone()).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Public stats view: identity, defaults for the common stats, then every
/// stored stat on top.
pub fn player_view(user: &User) -> Value {
    let profile = &user.minecraft;
    let stats = profile.stats.as_ref().map(document_to_json).unwrap_or_default();

    let mut view = json!({
        "username": user.username,
        "mcUsername": profile.mc_username,
        "minecraftUUID": profile.mc_uuid,
        "linked": true,
        "lastUpdated": profile.last_updated.map(to_iso),
        "lastSeen": "Never",
        "balance": 0,
        "playtime": "0h",
        "level": 1,
        "experience": 0,
        "blocks_mined": 0,
        "mobs_killed": 0,
        "deaths": 0,
        "rank": user.web_rank.as_str(),
        "advancements": [],
        "achievements": 0,
    });

    if let Value::Object(map) = &mut view {
        map.extend(stats);
    }
    view
}

pub async fn get_player(db: &MongoDB, identifier: &str) -> Result<Value, AppError> {
    let user = find_player(db, identifier)
        .await?
        .filter(|u| u.minecraft.mc_uuid.is_some() && u.minecraft.mc_username.is_some())
        .ok_or_else(|| AppError::not_found("Player not found or not linked"))?;
    Ok(player_view(&user))
}

/// Plugin-facing link check. Unknown players are not an error.
pub async fn player_status(db: &MongoDB, identifier: &str) -> Result<PlayerStatus, AppError> {
    let users = db.collection::<User>(USERS);
    let identifier = identifier.trim();

    let mut filters = vec![doc! { "username": identifier }];
    if let Some(uuid) = normalize_uuid(identifier) {
        filters.push(doc! { "minecraft.mcUUID": uuid });
    }
    let user = users.find_one(doc! { "$or": filters }).await?;

    Ok(match user.filter(|u| u.minecraft.is_linked()) {
        Some(user) => PlayerStatus {
            success: true,
            linked: true,
            error: None,
            user: Some(json!({
                "id": user.id_hex(),
                "username": user.username,
                "minecraftUUID": user.minecraft.mc_uuid,
            })),
        },
        None => PlayerStatus {
            success: true,
            linked: false,
            error: Some("Not linked".to_string()),
            user: None,
        },
    })
}

/// Replaces the stored stats blob for a linked player and tells the owner.
pub async fn update_stats(
    db: &MongoDB,
    hub: &EventHub,
    request: PlayerUpdateRequest,
) -> Result<(), AppError> {
    let (Some(raw_uuid), Some(mut stats)) = (request.mc_uuid, request.player_data) else {
        return Err(AppError::invalid("UUID and player data are required"));
    };
    let uuid = normalize_uuid(&raw_uuid).ok_or_else(|| AppError::not_found("Player not found"))?;

    let users = db.collection::<User>(USERS);
    let user = users
        .find_one(doc! { "minecraft.mcUUID": &uuid })
        .await?
        .ok_or_else(|| AppError::not_found("Player not found"))?;
    if !user.minecraft.is_linked() {
        return Err(AppError::invalid("Player is not linked to a website account"));
    }

    let removed = sanitize_stats(&mut stats);
    if !removed.is_empty() {
        log::warn!("⚠️  Dropped identity keys from stats update for {}: {:?}", uuid, removed);
    }
    let stats_doc = mongodb::bson::to_document(&stats)?;

    users
        .update_one(
            doc! { "_id": user.id, "minecraft.mcUUID": &uuid },
            doc! { "$set": {
                "minecraft.stats": stats_doc,
                "minecraft.lastUpdated": BsonDateTime::now(),
            } },
        )
        .await?;

    hub.send_to_user(
        &user.id_hex(),
        &UserEvent::new("stats_updated").with("mcUUID", uuid.as_str()),
    );
    Ok(())
}

/// Plugin push: forwards an arbitrary event to a user's open streams.
pub fn forward_event(hub: &EventHub, request: NotifyRequest) -> Result<usize, AppError> {
    let (Some(user_id), Some(event)) = (request.user_id, request.event) else {
        return Err(AppError::invalid("Missing required fields"));
    };
    let payload = request.data.unwrap_or_else(|| json!({}));
    Ok(hub.notify_user(&user_id, UserEvent::from_value(event, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MinecraftProfile;
    use rstest::rstest;

    #[rstest]
    #[case("069a79f4-44e9-4726-a5be-fca90e38aaf5", true)]
    #[case("069a79f444e94726a5befca90e38aaf5", true)]
    #[case("some-name", true)]
    #[case("Notch", false)]
    #[case("a_very_long_name", false)]
    fn classifies_identifiers(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(is_uuid_identifier(identifier), expected);
    }

    #[test]
    fn sanitize_strips_identity_keys_only() {
        let mut stats = json!({
            "linked": false,
            "mcUUID": "x",
            "isLinked": false,
            "balance": 12.5,
            "level": 7,
        })
        .as_object()
        .cloned()
        .unwrap();

        let removed = sanitize_stats(&mut stats);
        assert_eq!(removed, vec!["linked", "mcUUID", "isLinked"]);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["level"], 7);
    }

    #[test]
    fn name_regex_is_anchored_and_escaped() {
        let regex = exact_name_regex("a.b");
        assert_eq!(regex.pattern, "^a\\.b$");
        assert_eq!(regex.options, "i");
    }

    fn linked_user(stats: Option<Document>) -> User {
        let mut user = User::new("steve".into(), "steve@example.com".into(), "hash".into());
        user.minecraft = MinecraftProfile {
            linked: true,
            mc_username: Some("Steve".into()),
            mc_uuid: Some("069a79f4-44e9-4726-a5be-fca90e38aaf5".into()),
            stats,
            ..Default::default()
        };
        user
    }

    #[test]
    fn view_fills_defaults() {
        let view = player_view(&linked_user(None));
        assert_eq!(view["mcUsername"], "Steve");
        assert_eq!(view["level"], 1);
        assert_eq!(view["playtime"], "0h");
        assert_eq!(view["lastSeen"], "Never");
        assert_eq!(view["rank"], "user");
        assert_eq!(view["advancements"], json!([]));
    }

    #[test]
    fn stored_stats_override_defaults() {
        let view = player_view(&linked_user(Some(doc! {
            "level": 30,
            "rank": "VIP",
            "custom_stat": "x",
        })));
        assert_eq!(view["level"], 30);
        assert_eq!(view["rank"], "VIP");
        assert_eq!(view["custom_stat"], "x");
        assert_eq!(view["balance"], 0);
    }

    #[test]
    fn forward_event_requires_user_and_event() {
        let hub = EventHub::new();
        let missing = NotifyRequest {
            user_id: None,
            event: Some("x".into()),
            data: None,
            server_key: None,
        };
        assert!(forward_event(&hub, missing).is_err());

        let ok = NotifyRequest {
            user_id: Some("abc".into()),
            event: Some("custom".into()),
            data: Some(json!({ "a": 1 })),
            server_key: None,
        };
        assert_eq!(forward_event(&hub, ok).unwrap(), 0);
    }
}
