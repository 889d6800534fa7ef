use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumCategory {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "BsonDateTime::now")]
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumThread {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub slug: String,
    pub category: ObjectId,
    pub author: ObjectId,
    pub content: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub reply_count: i64,
    pub last_activity: BsonDateTime,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumPost {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub thread: ObjectId,
    pub author: ObjectId,
    pub content: String,
    #[serde(default)]
    pub likes: Vec<ObjectId>,
    pub created_at: BsonDateTime,
}

fn default_true() -> bool {
    true
}

/// Lowercase ASCII slug with single dashes, e.g. `"Hello, World!"` -> `"hello-world"`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Thread slugs carry the tail of the thread id so equal titles never collide.
pub fn thread_slug(title: &str, id: &ObjectId) -> String {
    let hex = id.to_hex();
    let suffix = &hex[hex.len() - 6..];
    let base = slugify(title);
    if base.is_empty() {
        format!("thread-{}", suffix)
    } else {
        format!("{}-{}", base, suffix)
    }
}
