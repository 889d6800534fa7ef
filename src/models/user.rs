use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};

use crate::utils::time::to_iso;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebRank {
    #[default]
    User,
    Helper,
    Moderator,
    Admin,
    Owner,
    Developer,
    ContentCreator,
    TiktokSub,
    Donor,
}

impl WebRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebRank::User => "user",
            WebRank::Helper => "helper",
            WebRank::Moderator => "moderator",
            WebRank::Admin => "admin",
            WebRank::Owner => "owner",
            WebRank::Developer => "developer",
            WebRank::ContentCreator => "content_creator",
            WebRank::TiktokSub => "tiktok_sub",
            WebRank::Donor => "donor",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, WebRank::Admin | WebRank::Owner)
    }

    /// Ranks allowed to manage forum categories.
    pub fn is_staff(&self) -> bool {
        matches!(self, WebRank::Moderator | WebRank::Admin | WebRank::Owner)
    }
}

/// The `minecraft` sub-document of a user. Optional fields are omitted when
/// unset so the sparse unique indexes on `mcUUID` and `linkCode` stay valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftProfile {
    #[serde(default)]
    pub linked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc_username: Option<String>,
    #[serde(rename = "mcUUID", default, skip_serializing_if = "Option::is_none")]
    pub mc_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_code_expires: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_at: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Document>,
}

impl MinecraftProfile {
    pub fn is_linked(&self) -> bool {
        self.linked && self.mc_uuid.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub web_rank: WebRank,
    #[serde(default = "BsonDateTime::now")]
    pub created_at: BsonDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<BsonDateTime>,
    #[serde(default)]
    pub login_attempts: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_until: Option<BsonDateTime>,
    #[serde(default)]
    pub friends: Vec<ObjectId>,
    #[serde(default)]
    pub following: Vec<ObjectId>,
    #[serde(default)]
    pub followers: Vec<ObjectId>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub minecraft: MinecraftProfile,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        User {
            id: None,
            username,
            email,
            password: password_hash,
            web_rank: WebRank::User,
            created_at: BsonDateTime::now(),
            last_login: None,
            login_attempts: 0,
            lock_until: None,
            friends: Vec::new(),
            following: Vec::new(),
            followers: Vec::new(),
            is_private: false,
            minecraft: MinecraftProfile::default(),
        }
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftInfo {
    pub linked: bool,
    pub mc_username: Option<String>,
    #[serde(rename = "mcUUID")]
    pub mc_uuid: Option<String>,
    pub linked_at: Option<String>,
}

/// What the API shows about an account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub web_rank: WebRank,
    pub created_at: String,
    pub last_login: Option<String>,
    pub is_private: bool,
    pub minecraft: MinecraftInfo,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        UserInfo {
            id: user.id_hex(),
            username: user.username.clone(),
            email: user.email.clone(),
            web_rank: user.web_rank,
            created_at: to_iso(user.created_at),
            last_login: user.last_login.map(to_iso),
            is_private: user.is_private,
            minecraft: MinecraftInfo {
                linked: user.minecraft.is_linked(),
                mc_username: user.minecraft.mc_username.clone(),
                mc_uuid: user.minecraft.mc_uuid.clone(),
                linked_at: user.minecraft.linked_at.map(to_iso),
            },
        }
    }
}

/// Compact form used in friend and follower lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub web_rank: WebRank,
    pub mc_username: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id_hex(),
            username: user.username.clone(),
            web_rank: user.web_rank,
            mc_username: user.minecraft.mc_username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc};

    #[test]
    fn unset_link_fields_are_not_written() {
        let user = User::new("steve".into(), "steve@example.com".into(), "hash".into());
        let document = bson::to_document(&user).unwrap();
        let minecraft = document.get_document("minecraft").unwrap();

        assert!(!minecraft.contains_key("mcUUID"));
        assert!(!minecraft.contains_key("linkCode"));
        assert_eq!(document.get_str("webRank").unwrap(), "user");
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn sparse_documents_deserialize_with_defaults() {
        let document = doc! {
            "_id": ObjectId::new(),
            "username": "alex",
            "email": "alex@example.com",
            "password": "hash",
            "webRank": "content_creator",
            "minecraft": { "linked": true, "mcUUID": "069a79f4-44e9-4726-a5be-fca90e38aaf5" },
        };
        let user: User = bson::from_document(document).unwrap();

        assert_eq!(user.web_rank, WebRank::ContentCreator);
        assert!(user.minecraft.is_linked());
        assert!(user.friends.is_empty());
        assert_eq!(user.login_attempts, 0);
    }

    #[test]
    fn user_info_hides_password() {
        let user = User::new("steve".into(), "steve@example.com".into(), "hash".into());
        let json = serde_json::to_value(UserInfo::from(&user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["minecraft"]["linked"], false);
    }

    #[test]
    fn rank_permissions() {
        assert!(WebRank::Owner.is_admin());
        assert!(!WebRank::Moderator.is_admin());
        assert!(WebRank::Moderator.is_staff());
        assert!(!WebRank::Donor.is_staff());
    }
}
