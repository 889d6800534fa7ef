use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::utils::time::to_iso;

pub const FRIEND_REQUEST: &str = "friend_request";
pub const FRIEND_ACCEPTED: &str = "friend_accepted";
pub const NEW_FOLLOWER: &str = "new_follower";
pub const ACCOUNT_LINKED: &str = "account_linked";
pub const FORUM_REPLY: &str = "forum_reply";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipient: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ObjectId>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Document>,
    pub created_at: BsonDateTime,
}

impl Notification {
    pub fn new(recipient: ObjectId, sender: Option<ObjectId>, kind: &str, message: String) -> Self {
        Notification {
            id: None,
            recipient,
            sender,
            message,
            kind: kind.to_string(),
            read: false,
            data: None,
            created_at: BsonDateTime::now(),
        }
    }

    pub fn with_data(mut self, data: Document) -> Self {
        self.data = Some(data);
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.map(|id| id.to_hex()),
            "recipient": self.recipient.to_hex(),
            "sender": self.sender.map(|id| id.to_hex()),
            "message": self.message,
            "type": self.kind,
            "read": self.read,
            "data": self
                .data
                .clone()
                .map(|d| mongodb::bson::Bson::Document(d).into_relaxed_extjson()),
            "createdAt": to_iso(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn json_uses_hex_ids_and_type_key() {
        let recipient = ObjectId::new();
        let notification = Notification::new(recipient, None, FRIEND_REQUEST, "hi".into())
            .with_data(doc! { "requestId": "abc" });
        let json = notification.to_json();

        assert_eq!(json["recipient"], recipient.to_hex());
        assert_eq!(json["type"], "friend_request");
        assert_eq!(json["read"], false);
        assert_eq!(json["data"]["requestId"], "abc");
    }
}
