use std::collections::HashMap;

use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    database::{MongoDB, FRIEND_REQUESTS, USERS},
    models::{
        notification, FriendRequest, FriendRequestStatus, Notification, User, UserSummary,
    },
    realtime::EventHub,
    services::{auth_service::find_user, notification_service},
    utils::{error::AppError, time::to_iso},
};

#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdRequest {
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendIdRequest {
    pub friend_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: String,
    pub sender: Option<UserSummary>,
    pub status: FriendRequestStatus,
    pub created_at: String,
}

/// Public summaries for a set of user ids, keyed by id.
pub async fn load_summaries(
    db: &MongoDB,
    ids: &[ObjectId],
) -> Result<HashMap<ObjectId, UserSummary>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users: Vec<User> = db
        .collection::<User>(USERS)
        .find(doc! { "_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;

    Ok(users
        .iter()
        .filter_map(|u| u.id.map(|id| (id, UserSummary::from(u))))
        .collect())
}

/// Summaries in the order of `ids`, skipping accounts that no longer exist.
async fn summaries_in_order(db: &MongoDB, ids: &[ObjectId]) -> Result<Vec<UserSummary>, AppError> {
    let mut found = load_summaries(db, ids).await?;
    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}

async fn find_by_username(db: &MongoDB, username: &str) -> Result<User, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::invalid("Username is required"));
    }
    db.collection::<User>(USERS)
        .find_one(doc! { "username": username })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

fn require_id(user: &User) -> Result<ObjectId, AppError> {
    user.id
        .ok_or_else(|| AppError::Internal("User document without _id".into()))
}

/// Best-effort notification: the social action already succeeded.
async fn notify(db: &MongoDB, hub: &EventHub, note: Notification) {
    if let Err(e) = notification_service::create(db, hub, note).await {
        log::warn!("⚠️  Notification not stored: {}", e);
    }
}

// ==================== FRIENDS ====================

pub async fn list_friends(db: &MongoDB, user_id: &ObjectId) -> Result<Vec<UserSummary>, AppError> {
    let user = find_user(db, user_id).await?;
    summaries_in_order(db, &user.friends).await
}

/// Rules for a new request: not to yourself, not to a friend, and no pending
/// request between the two users in either direction.
pub fn check_new_request(
    sender_id: &ObjectId,
    recipient_id: &ObjectId,
    already_friends: bool,
    pending: Option<&FriendRequest>,
) -> Result<(), AppError> {
    if sender_id == recipient_id {
        return Err(AppError::invalid("You cannot send a friend request to yourself"));
    }
    if already_friends {
        return Err(AppError::invalid("You are already friends with this user"));
    }
    match pending {
        Some(existing) if &existing.sender == sender_id => {
            Err(AppError::invalid("Friend request already sent"))
        }
        Some(_) => Err(AppError::invalid(
            "This user has already sent you a friend request",
        )),
        None => Ok(()),
    }
}

pub async fn send_friend_request(
    db: &MongoDB,
    hub: &EventHub,
    sender_id: &ObjectId,
    username: &str,
) -> Result<(), AppError> {
    let recipient = find_by_username(db, username).await?;
    let recipient_id = require_id(&recipient)?;
    let sender = find_user(db, sender_id).await?;
    let already_friends = sender.friends.contains(&recipient_id);

    let requests = db.collection::<FriendRequest>(FRIEND_REQUESTS);
    let existing = requests
        .find_one(doc! {
            "status": "pending",
            "$or": [
                { "sender": sender_id, "recipient": recipient_id },
                { "sender": recipient_id, "recipient": sender_id },
            ]
        })
        .await?;
    check_new_request(sender_id, &recipient_id, already_friends, existing.as_ref())?;

    let result = requests
        .insert_one(&FriendRequest::pending(*sender_id, recipient_id))
        .await?;
    let request_id = result
        .inserted_id
        .as_object_id()
        .map(|id| id.to_hex())
        .unwrap_or_default();

    notify(
        db,
        hub,
        Notification::new(
            recipient_id,
            Some(*sender_id),
            notification::FRIEND_REQUEST,
            format!("{} sent you a friend request", sender.username),
        )
        .with_data(doc! { "requestId": request_id }),
    )
    .await;

    Ok(())
}

async fn pending_request_for(
    db: &MongoDB,
    user_id: &ObjectId,
    request_id: &ObjectId,
    action: &str,
) -> Result<FriendRequest, AppError> {
    let request = db
        .collection::<FriendRequest>(FRIEND_REQUESTS)
        .find_one(doc! { "_id": request_id })
        .await?
        .ok_or_else(|| AppError::not_found("Friend request not found"))?;
    check_pending(&request, user_id, action)?;
    Ok(request)
}

/// Only the recipient may answer, and only while the request is pending.
pub fn check_pending(
    request: &FriendRequest,
    user_id: &ObjectId,
    action: &str,
) -> Result<(), AppError> {
    if &request.recipient != user_id {
        return Err(AppError::forbidden(format!(
            "Not authorized to {} this request",
            action
        )));
    }
    let status = match request.status {
        FriendRequestStatus::Pending => return Ok(()),
        FriendRequestStatus::Accepted => "accepted",
        FriendRequestStatus::Rejected => "rejected",
    };
    Err(AppError::invalid(format!("Request already {}", status)))
}

/// Moves a pending request on. Fails if another call got there first.
async fn set_request_status(
    db: &MongoDB,
    request_id: &ObjectId,
    status: &str,
) -> Result<(), AppError> {
    let result = db
        .collection::<FriendRequest>(FRIEND_REQUESTS)
        .update_one(
            doc! { "_id": request_id, "status": "pending" },
            doc! { "$set": { "status": status, "updatedAt": BsonDateTime::now() } },
        )
        .await?;
    ensure_transitioned(result.matched_count)
}

fn ensure_transitioned(matched: u64) -> Result<(), AppError> {
    if matched == 0 {
        return Err(AppError::invalid("Request already handled"));
    }
    Ok(())
}

pub async fn accept_friend_request(
    db: &MongoDB,
    hub: &EventHub,
    user_id: &ObjectId,
    request_id: &ObjectId,
) -> Result<(), AppError> {
    let request = pending_request_for(db, user_id, request_id, "accept").await?;
    set_request_status(db, request_id, "accepted").await?;

    let users = db.collection::<User>(USERS);
    users
        .update_one(
            doc! { "_id": request.sender },
            doc! { "$addToSet": { "friends": request.recipient } },
        )
        .await?;
    users
        .update_one(
            doc! { "_id": request.recipient },
            doc! { "$addToSet": { "friends": request.sender } },
        )
        .await?;

    let accepter = find_user(db, user_id).await?;
    notify(
        db,
        hub,
        Notification::new(
            request.sender,
            Some(*user_id),
            notification::FRIEND_ACCEPTED,
            format!("{} accepted your friend request", accepter.username),
        ),
    )
    .await;

    Ok(())
}

pub async fn reject_friend_request(
    db: &MongoDB,
    user_id: &ObjectId,
    request_id: &ObjectId,
) -> Result<(), AppError> {
    pending_request_for(db, user_id, request_id, "reject").await?;
    set_request_status(db, request_id, "rejected").await
}

pub async fn pending_requests(
    db: &MongoDB,
    user_id: &ObjectId,
) -> Result<Vec<PendingRequest>, AppError> {
    let requests: Vec<FriendRequest> = db
        .collection::<FriendRequest>(FRIEND_REQUESTS)
        .find(doc! { "recipient": user_id, "status": "pending" })
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    let sender_ids: Vec<ObjectId> = requests.iter().map(|r| r.sender).collect();
    let senders = load_summaries(db, &sender_ids).await?;

    Ok(requests
        .iter()
        .map(|r| PendingRequest {
            id: r.id.map(|id| id.to_hex()).unwrap_or_default(),
            sender: senders.get(&r.sender).cloned(),
            status: r.status,
            created_at: to_iso(r.created_at),
        })
        .collect())
}

pub async fn remove_friend(
    db: &MongoDB,
    user_id: &ObjectId,
    friend_id: &ObjectId,
) -> Result<(), AppError> {
    let user = find_user(db, user_id).await?;
    find_user(db, friend_id).await?;
    if !user.friends.contains(friend_id) {
        return Err(AppError::invalid("Not friends with this user"));
    }

    let users = db.collection::<User>(USERS);
    users
        .update_one(doc! { "_id": user_id }, doc! { "$pull": { "friends": friend_id } })
        .await?;
    users
        .update_one(doc! { "_id": friend_id }, doc! { "$pull": { "friends": user_id } })
        .await?;
    Ok(())
}

// ==================== FOLLOWING ====================

pub async fn list_following(db: &MongoDB, user_id: &ObjectId) -> Result<Vec<UserSummary>, AppError> {
    let user = find_user(db, user_id).await?;
    summaries_in_order(db, &user.following).await
}

pub async fn list_followers(db: &MongoDB, user_id: &ObjectId) -> Result<Vec<UserSummary>, AppError> {
    let user = find_user(db, user_id).await?;
    summaries_in_order(db, &user.followers).await
}

/// Returns the message for the response; following twice is not an error.
pub async fn follow(
    db: &MongoDB,
    hub: &EventHub,
    user_id: &ObjectId,
    username: &str,
) -> Result<String, AppError> {
    let target = find_by_username(db, username).await?;
    let target_id = require_id(&target)?;
    if &target_id == user_id {
        return Err(AppError::invalid("You cannot follow yourself"));
    }

    let current = find_user(db, user_id).await?;
    if current.following.contains(&target_id) {
        return Ok("Already following this user".to_string());
    }

    let users = db.collection::<User>(USERS);
    users
        .update_one(doc! { "_id": user_id }, doc! { "$addToSet": { "following": target_id } })
        .await?;
    users
        .update_one(doc! { "_id": target_id }, doc! { "$addToSet": { "followers": user_id } })
        .await?;

    notify(
        db,
        hub,
        Notification::new(
            target_id,
            Some(*user_id),
            notification::NEW_FOLLOWER,
            format!("{} started following you", current.username),
        ),
    )
    .await;

    Ok(format!("Now following {}", target.username))
}

pub async fn unfollow(db: &MongoDB, user_id: &ObjectId, username: &str) -> Result<String, AppError> {
    let target = find_by_username(db, username).await?;
    let target_id = require_id(&target)?;

    let current = find_user(db, user_id).await?;
    if !current.following.contains(&target_id) {
        return Ok("Not following this user".to_string());
    }

    let users = db.collection::<User>(USERS);
    users
        .update_one(doc! { "_id": user_id }, doc! { "$pull": { "following": target_id } })
        .await?;
    users
        .update_one(doc! { "_id": target_id }, doc! { "$pull": { "followers": user_id } })
        .await?;

    Ok(format!("No longer following {}", target.username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use rstest::rstest;

    #[test]
    fn request_bodies_use_camel_case() {
        let body: RequestIdRequest = serde_json::from_str(r#"{"requestId":"abc"}"#).unwrap();
        assert_eq!(body.request_id, "abc");
        let body: FriendIdRequest = serde_json::from_str(r#"{"friendId":"def"}"#).unwrap();
        assert_eq!(body.friend_id, "def");
    }

    #[test]
    fn pending_request_serializes_status() {
        let pending = PendingRequest {
            id: "1".into(),
            sender: None,
            status: FriendRequestStatus::Pending,
            created_at: "2025-01-01T00:00:00+00:00".into(),
        };
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["createdAt"], "2025-01-01T00:00:00+00:00");
    }

    fn request(sender: ObjectId, recipient: ObjectId, status: FriendRequestStatus) -> FriendRequest {
        FriendRequest {
            status,
            ..FriendRequest::pending(sender, recipient)
        }
    }

    #[test]
    fn self_and_existing_friends_are_rejected() {
        let me = ObjectId::new();
        let other = ObjectId::new();

        let err = check_new_request(&me, &me, false, None).unwrap_err();
        assert_eq!(err.to_string(), "You cannot send a friend request to yourself");
        let err = check_new_request(&me, &other, true, None).unwrap_err();
        assert_eq!(err.to_string(), "You are already friends with this user");
        assert!(check_new_request(&me, &other, false, None).is_ok());
    }

    #[test]
    fn pending_request_blocks_both_directions() {
        let me = ObjectId::new();
        let other = ObjectId::new();

        let mine = request(me, other, FriendRequestStatus::Pending);
        let err = check_new_request(&me, &other, false, Some(&mine)).unwrap_err();
        assert_eq!(err.to_string(), "Friend request already sent");

        let theirs = request(other, me, FriendRequestStatus::Pending);
        let err = check_new_request(&me, &other, false, Some(&theirs)).unwrap_err();
        assert_eq!(err.to_string(), "This user has already sent you a friend request");
    }

    #[rstest]
    #[case(FriendRequestStatus::Pending, None)]
    #[case(FriendRequestStatus::Accepted, Some("Request already accepted"))]
    #[case(FriendRequestStatus::Rejected, Some("Request already rejected"))]
    fn only_pending_requests_can_be_answered(
        #[case] status: FriendRequestStatus,
        #[case] expected: Option<&str>,
    ) {
        let recipient = ObjectId::new();
        let req = request(ObjectId::new(), recipient, status);
        let result = check_pending(&req, &recipient, "accept");
        assert_eq!(result.err().map(|e| e.to_string()).as_deref(), expected);
    }

    #[test]
    fn only_the_recipient_can_answer() {
        let sender = ObjectId::new();
        let req = request(sender, ObjectId::new(), FriendRequestStatus::Pending);

        let err = check_pending(&req, &sender, "reject").unwrap_err();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Not authorized to reject this request");
    }

    #[test]
    fn lost_race_is_reported() {
        assert!(ensure_transitioned(1).is_ok());
        let err = ensure_transitioned(0).unwrap_err();
        assert_eq!(err.to_string(), "Request already handled");
    }
}
