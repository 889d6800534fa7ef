use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub sender: ObjectId,
    pub recipient: ObjectId,
    pub status: FriendRequestStatus,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl FriendRequest {
    pub fn pending(sender: ObjectId, recipient: ObjectId) -> Self {
        let now = BsonDateTime::now();
        FriendRequest {
            id: None,
            sender,
            recipient,
            status: FriendRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    #[test]
    fn status_is_stored_lowercase() {
        let request = FriendRequest::pending(ObjectId::new(), ObjectId::new());
        let document = bson::to_document(&request).unwrap();
        assert_eq!(document.get_str("status").unwrap(), "pending");
    }
}
