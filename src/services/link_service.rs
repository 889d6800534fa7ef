use chrono::{DateTime, Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    database::{MongoDB, USERS},
    models::{notification, Notification, SecurityAction, User, UserInfo},
    realtime::{EventHub, UserEvent},
    services::{
        auth_service::{self, find_user},
        notification_service,
        security_log_service::{self, ClientInfo},
    },
    utils::{
        error::{is_duplicate_key, AppError},
        link_code::{generate_link_code, is_valid_minecraft_username, normalize_code, normalize_uuid},
        time::{bson_from_chrono, chrono_from_bson, now_millis},
    },
};

const CODE_INSERT_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkCodeInfo {
    pub code: String,
    pub expires_at: String,
    pub expires_in_seconds: i64,
    /// What the player types in game.
    pub command: String,
}

impl LinkCodeInfo {
    fn new(code: String, expires: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        LinkCodeInfo {
            command: format!("/link {}", code),
            code,
            expires_at: expires.to_rfc3339(),
            expires_in_seconds: (expires - now).num_seconds().max(0),
        }
    }
}

/// Sent by the Minecraft plugin. Field names follow the plugin; the
/// website's `linkCode`/`mcUsername`/`mcUUID` spellings are accepted too.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ValidateLinkRequest {
    #[serde(alias = "linkCode")]
    pub code: String,
    #[serde(alias = "mcUsername")]
    pub username: String,
    #[serde(alias = "mcUUID")]
    pub uuid: String,
    #[serde(rename = "serverKey", default)]
    pub server_key: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkResult {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub linked: bool,
    pub mc_username: Option<String>,
    #[serde(rename = "mcUUID")]
    pub mc_uuid: Option<String>,
    pub linked_at: Option<String>,
    pub pending_code: Option<LinkCodeInfo>,
}

#[derive(Debug, Deserialize)]
pub struct PluginUnlinkRequest {
    #[serde(alias = "mcUUID")]
    pub uuid: String,
    #[serde(default, alias = "mcUsername")]
    pub username: Option<String>,
    #[serde(rename = "serverKey", default)]
    pub server_key: Option<String>,
}

fn active_code(user: &User, now: DateTime<Utc>) -> Option<LinkCodeInfo> {
    let code = user.minecraft.link_code.clone()?;
    let expires = chrono_from_bson(user.minecraft.link_code_expires?);
    (expires > now).then(|| LinkCodeInfo::new(code, expires, now))
}

/// Matches the user only while they hold no unexpired code.
fn without_active_code(user_id: &ObjectId, now: DateTime<Utc>) -> Document {
    doc! {
        "_id": user_id,
        "$or": [
            { "minecraft.linkCodeExpires": { "$lte": bson_from_chrono(now) } },
            { "minecraft.linkCodeExpires": Bson::Null },
        ]
    }
}

/// Returns the user's still-valid code, or stores a fresh one. The flag is
/// `true` when a new code was created.
pub async fn generate_code(
    db: &MongoDB,
    config: &Config,
    user_id: &ObjectId,
) -> Result<(LinkCodeInfo, bool), AppError> {
    let user = find_user(db, user_id).await?;
    if user.minecraft.is_linked() {
        return Err(AppError::invalid("Your account is already linked to Minecraft"));
    }

    let now = Utc::now();
    if let Some(existing) = active_code(&user, now) {
        log::info!("♻️  Reusing link code for {}", user.username);
        return Ok((existing, false));
    }

    let expires = now + Duration::minutes(config.link_code_ttl_minutes);
    let collection = db.collection::<User>(USERS);

    for _ in 0..CODE_INSERT_ATTEMPTS {
        let code = generate_link_code();
        let update = doc! {
            "$set": {
                "minecraft.linkCode": &code,
                "minecraft.linkCodeExpires": bson_from_chrono(expires),
            }
        };

        match collection.update_one(without_active_code(user_id, now), update).await {
            Ok(result) if result.matched_count == 0 => {
                // A concurrent call stored a code first; hand that one back.
                let user = find_user(db, user_id).await?;
                return active_code(&user, Utc::now())
                    .map(|existing| (existing, false))
                    .ok_or_else(|| AppError::invalid("Your account is already linked to Minecraft"));
            }
            Ok(_) => {
                log::info!("🔑 Link code generated for {}", user.username);
                return Ok((LinkCodeInfo::new(code, expires, now), true));
            }
            Err(e) if is_duplicate_key(&e) => {
                log::debug!("Link code collision, generating another");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal("Could not allocate a unique link code".into()))
}

pub async fn get_active_code(
    db: &MongoDB,
    user_id: &ObjectId,
) -> Result<Option<LinkCodeInfo>, AppError> {
    let user = find_user(db, user_id).await?;
    Ok(active_code(&user, Utc::now()))
}

pub async fn link_status(db: &MongoDB, user_id: &ObjectId) -> Result<LinkStatus, AppError> {
    let user = find_user(db, user_id).await?;
    let linked = user.minecraft.is_linked();

    Ok(LinkStatus {
        linked,
        mc_username: user.minecraft.mc_username.clone(),
        mc_uuid: user.minecraft.mc_uuid.clone(),
        linked_at: user.minecraft.linked_at.map(crate::utils::time::to_iso),
        pending_code: if linked { None } else { active_code(&user, Utc::now()) },
    })
}

/// Validated plugin input: uppercased code, dashed lowercase UUID, username.
pub fn parse_validate_request(
    request: &ValidateLinkRequest,
) -> Result<(String, String, String), AppError> {
    let code = normalize_code(&request.code);
    if code.is_empty() {
        return Err(AppError::invalid("No code provided"));
    }
    let username = request.username.trim();
    if username.is_empty() || request.uuid.trim().is_empty() {
        return Err(AppError::invalid("Missing Minecraft user information"));
    }
    let uuid = normalize_uuid(&request.uuid)
        .ok_or_else(|| AppError::invalid("Invalid Minecraft UUID format"))?;
    if !is_valid_minecraft_username(username) {
        return Err(AppError::invalid("Invalid Minecraft username format"));
    }
    Ok((code, uuid, username.to_string()))
}

/// Consumes a link code and binds the Minecraft account to its owner.
///
/// The code is cleared in the same `findOneAndUpdate` that links the
/// account, filtered on the code still being unexpired, so concurrent
/// validations of one code can succeed at most once.
pub async fn validate_code(
    db: &MongoDB,
    config: &Config,
    hub: &EventHub,
    request: &ValidateLinkRequest,
    client: &ClientInfo,
) -> Result<LinkResult, AppError> {
    let (code, uuid, mc_username) = parse_validate_request(request)?;
    let collection = db.collection::<User>(USERS);

    let owner = collection
        .find_one(doc! { "minecraft.linkCode": &code })
        .await?
        .ok_or_else(|| AppError::not_found("Invalid or expired link code"))?;
    let owner_id = owner
        .id
        .ok_or_else(|| AppError::Internal("User document without _id".into()))?;

    let now = BsonDateTime::now();
    let expired = owner
        .minecraft
        .link_code_expires
        .map_or(true, |expires| expires <= now);
    if expired {
        return Err(AppError::invalid("Link code has expired"));
    }

    let holder = collection
        .find_one(doc! { "minecraft.mcUUID": &uuid, "_id": { "$ne": owner_id } })
        .await?;
    if let Some(holder) = holder {
        log::warn!(
            "⚠️  UUID {} already linked to {}, refused for {}",
            uuid,
            holder.username,
            owner.username
        );
        return Err(AppError::invalid(
            "This Minecraft account is already linked to another user",
        ));
    }

    let user = collection
        .find_one_and_update(
            doc! {
                "_id": owner_id,
                "minecraft.linkCode": &code,
                "minecraft.linkCodeExpires": { "$gt": now },
            },
            doc! {
                "$set": {
                    "minecraft.linked": true,
                    "minecraft.mcUsername": &mc_username,
                    "minecraft.mcUUID": &uuid,
                    "minecraft.linkedAt": now,
                },
                "$unset": { "minecraft.linkCode": "", "minecraft.linkCodeExpires": "" },
            },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Invalid or expired link code"))?;

    log::info!("🔗 {} linked to Minecraft account {} ({})", user.username, mc_username, uuid);

    security_log_service::record(
        db,
        Some(owner_id),
        SecurityAction::MinecraftLink,
        client,
        Some(doc! { "mcUsername": &mc_username, "mcUUID": &uuid, "success": true }),
    )
    .await;

    let message = format!(
        "Your Minecraft account ({}) has been successfully linked!",
        mc_username
    );
    let note = Notification::new(owner_id, None, notification::ACCOUNT_LINKED, message.clone())
        .with_data(doc! { "mcUsername": &mc_username, "mcUUID": &uuid });
    if let Err(e) = notification_service::create(db, hub, note).await {
        log::warn!("⚠️  Link notification not stored: {}", e);
    }

    hub.notify_user(
        &owner_id.to_hex(),
        UserEvent::new("minecraft_linked")
            .with("mcUsername", mc_username.as_str())
            .with("mcUUID", uuid.as_str())
            .with("userId", owner_id.to_hex())
            .with("message", message)
            .with("timestamp", now_millis()),
    );

    let token = auth_service::generate_jwt(config, &user)?;
    Ok(LinkResult {
        success: true,
        message: "Minecraft account linked successfully".to_string(),
        token,
        user: UserInfo::from(&user),
    })
}

/// Clears every link field. `source` is "web" or "plugin" for the logs.
async fn clear_link(
    db: &MongoDB,
    hub: &EventHub,
    user: &User,
    source: &str,
    client: &ClientInfo,
) -> Result<(), AppError> {
    let user_id = user
        .id
        .ok_or_else(|| AppError::Internal("User document without _id".into()))?;

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! {
                "$set": { "minecraft.linked": false },
                "$unset": {
                    "minecraft.mcUsername": "",
                    "minecraft.mcUUID": "",
                    "minecraft.linkCode": "",
                    "minecraft.linkCodeExpires": "",
                    "minecraft.linkedAt": "",
                },
            },
        )
        .await?;

    log::info!("🔓 {} unlinked Minecraft account ({})", user.username, source);

    security_log_service::record(
        db,
        Some(user_id),
        SecurityAction::MinecraftUnlink,
        client,
        Some(doc! {
            "mcUsername": user.minecraft.mc_username.clone(),
            "mcUUID": user.minecraft.mc_uuid.clone(),
            "source": source,
        }),
    )
    .await;

    hub.notify_user(
        &user_id.to_hex(),
        UserEvent::new("account_unlinked")
            .with("userId", user_id.to_hex())
            .with("source", source)
            .with("timestamp", now_millis()),
    );

    Ok(())
}

/// Website side: the logged-in user drops their own link.
pub async fn unlink_user(
    db: &MongoDB,
    hub: &EventHub,
    user_id: &ObjectId,
    client: &ClientInfo,
) -> Result<(), AppError> {
    let user = find_user(db, user_id).await?;
    if !user.minecraft.is_linked() {
        return Err(AppError::invalid("No Minecraft account is linked"));
    }
    clear_link(db, hub, &user, "web", client).await
}

/// Plugin side: unlink whichever account holds `uuid`. Returns the website
/// username.
pub async fn unlink_by_uuid(
    db: &MongoDB,
    hub: &EventHub,
    uuid: &str,
    client: &ClientInfo,
) -> Result<String, AppError> {
    let uuid = normalize_uuid(uuid).ok_or_else(|| AppError::invalid("Invalid Minecraft UUID format"))?;
    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "minecraft.mcUUID": &uuid })
        .await?
        .ok_or_else(|| AppError::not_found("No user found with this Minecraft account"))?;

    clear_link(db, hub, &user, "plugin", client).await?;
    Ok(user.username)
}

/// Removes expired, unused codes. Returns how many were cleared.
pub async fn purge_expired_codes(db: &MongoDB) -> Result<u64, AppError> {
    let result = db
        .collection::<User>(USERS)
        .update_many(
            doc! { "minecraft.linkCodeExpires": { "$lte": BsonDateTime::now() } },
            doc! { "$unset": { "minecraft.linkCode": "", "minecraft.linkCodeExpires": "" } },
        )
        .await?;
    Ok(result.modified_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(code: &str, username: &str, uuid: &str) -> ValidateLinkRequest {
        ValidateLinkRequest {
            code: code.into(),
            username: username.into(),
            uuid: uuid.into(),
            server_key: None,
        }
    }

    #[test]
    fn validate_request_is_normalized() {
        let (code, uuid, name) = parse_validate_request(&request(
            "ab3def",
            "Notch",
            "069A79F444E94726A5BEFCA90E38AAF5",
        ))
        .unwrap();
        assert_eq!(code, "AB3DEF");
        assert_eq!(uuid, "069a79f4-44e9-4726-a5be-fca90e38aaf5");
        assert_eq!(name, "Notch");
    }

    #[test]
    fn validate_request_rejects_bad_input() {
        assert!(parse_validate_request(&request("", "Notch", "069a79f444e94726a5befca90e38aaf5")).is_err());
        assert!(parse_validate_request(&request("ABCDEF", "", "069a79f444e94726a5befca90e38aaf5")).is_err());
        assert!(parse_validate_request(&request("ABCDEF", "Notch", "not-a-uuid")).is_err());
        assert!(parse_validate_request(&request("ABCDEF", "x", "069a79f444e94726a5befca90e38aaf5")).is_err());
    }

    #[test]
    fn plugin_field_names_are_accepted() {
        let parsed: ValidateLinkRequest = serde_json::from_str(
            r#"{"linkCode":"ABCDEF","mcUsername":"Notch","mcUUID":"069a79f444e94726a5befca90e38aaf5","serverKey":"k"}"#,
        )
        .unwrap();
        assert_eq!(parsed.code, "ABCDEF");
        assert_eq!(parsed.server_key.as_deref(), Some("k"));
    }

    #[test]
    fn still_valid_code_is_reused() {
        let now = Utc::now();
        let mut user = User::new("steve".into(), "s@example.com".into(), "h".into());
        user.minecraft.link_code = Some("ABCDEF".into());
        user.minecraft.link_code_expires = Some(bson_from_chrono(now + Duration::minutes(10)));

        let info = active_code(&user, now).unwrap();
        assert_eq!(info.code, "ABCDEF");
        assert_eq!(info.command, "/link ABCDEF");
        assert!((599..=600).contains(&info.expires_in_seconds));
    }

    #[test]
    fn expired_code_is_not_reused() {
        let now = Utc::now();
        let mut user = User::new("steve".into(), "s@example.com".into(), "h".into());
        user.minecraft.link_code = Some("ABCDEF".into());
        user.minecraft.link_code_expires = Some(bson_from_chrono(now - Duration::seconds(1)));

        assert!(active_code(&user, now).is_none());
    }

    #[test]
    fn fresh_code_needs_no_unexpired_code() {
        let user_id = ObjectId::new();
        let now = Utc::now();
        let filter = without_active_code(&user_id, now);

        assert_eq!(filter.get_object_id("_id").unwrap(), user_id);
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
        let expired = branches[0].as_document().unwrap();
        assert_eq!(
            expired
                .get_document("minecraft.linkCodeExpires")
                .unwrap()
                .get_datetime("$lte")
                .unwrap(),
            &bson_from_chrono(now)
        );
        let missing = branches[1].as_document().unwrap();
        assert_eq!(missing.get("minecraft.linkCodeExpires"), Some(&Bson::Null));
    }

    #[tokio::test]
    #[ignore] // needs a running MongoDB
    async fn concurrent_generation_yields_one_code() {
        let uri = std::env::var("MONGO_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/bizzylink_test".to_string());
        let db = MongoDB::new(&uri).await.unwrap();
        let config = crate::config::test_config();

        let user = User::new(
            format!("g{}", &ObjectId::new().to_hex()[18..]),
            format!("{}@example.com", ObjectId::new().to_hex()),
            "hash".into(),
        );
        let inserted = db.collection::<User>(USERS).insert_one(&user).await.unwrap();
        let user_id = inserted.inserted_id.as_object_id().unwrap();

        let (a, b) = tokio::join!(
            generate_code(&db, &config, &user_id),
            generate_code(&db, &config, &user_id)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.0.code, b.0.code);
        assert!(a.1 ^ b.1);

        let stored = find_user(&db, &user_id).await.unwrap();
        assert_eq!(stored.minecraft.link_code.as_deref(), Some(a.0.code.as_str()));

        db.collection::<User>(USERS)
            .delete_one(doc! { "_id": user_id })
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // needs a running MongoDB
    async fn code_is_consumed_once() {
        let uri = std::env::var("MONGO_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/bizzylink_test".to_string());
        let db = MongoDB::new(&uri).await.unwrap();
        let config = crate::config::test_config();
        let hub = EventHub::new();

        let mut user = User::new(
            format!("t{}", &ObjectId::new().to_hex()[18..]),
            format!("{}@example.com", ObjectId::new().to_hex()),
            "hash".into(),
        );
        let inserted = db.collection::<User>(USERS).insert_one(&user).await.unwrap();
        user.id = inserted.inserted_id.as_object_id();
        let user_id = user.id.unwrap();

        let (info, created) = generate_code(&db, &config, &user_id).await.unwrap();
        assert!(created);
        let (again, created) = generate_code(&db, &config, &user_id).await.unwrap();
        assert!(!created);
        assert_eq!(again.code, info.code);

        let uuid = uuid::Uuid::new_v4().to_string();
        let req = request(&info.code, "Tester", &uuid);
        let client = ClientInfo::default();
        assert!(validate_code(&db, &config, &hub, &req, &client).await.is_ok());
        assert!(matches!(
            validate_code(&db, &config, &hub, &req, &client).await,
            Err(AppError::NotFound(_))
        ));

        db.collection::<User>(USERS)
            .delete_one(doc! { "_id": user_id })
            .await
            .unwrap();
    }
}
