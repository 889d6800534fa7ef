use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use serde_json::Value;

use crate::{
    database::{MongoDB, NOTIFICATIONS},
    models::Notification,
    realtime::{EventHub, UserEvent},
    services::social_service::load_summaries,
    utils::error::AppError,
};

pub const LIST_LIMIT: i64 = 50;

/// The SSE form of a stored notification: `{"type":"notification", ...}`
/// with the notification's own kind under `notificationType`.
pub fn notification_event(notification: &Notification) -> UserEvent {
    UserEvent::from_value("notification", notification.to_json())
        .with("notificationType", notification.kind.as_str())
}

/// Stores the notification and pushes it to the recipient's open streams.
pub async fn create(
    db: &MongoDB,
    hub: &EventHub,
    mut notification: Notification,
) -> Result<Notification, AppError> {
    let result = db
        .collection::<Notification>(NOTIFICATIONS)
        .insert_one(&notification)
        .await?;
    notification.id = result.inserted_id.as_object_id();

    let delivered = hub.notify_user(&notification.recipient.to_hex(), notification_event(&notification));
    log::debug!(
        "🔔 Notification '{}' stored for {} ({} live client(s))",
        notification.kind,
        notification.recipient,
        delivered
    );

    Ok(notification)
}

/// Newest first, at most 50, with the sender's public summary attached.
pub async fn list(db: &MongoDB, user_id: &ObjectId) -> Result<Vec<Value>, AppError> {
    let notifications: Vec<Notification> = db
        .collection::<Notification>(NOTIFICATIONS)
        .find(doc! { "recipient": user_id })
        .sort(doc! { "createdAt": -1 })
        .limit(LIST_LIMIT)
        .await?
        .try_collect()
        .await?;

    let sender_ids: Vec<ObjectId> = notifications.iter().filter_map(|n| n.sender).collect();
    let senders = load_summaries(db, &sender_ids).await?;

    Ok(notifications
        .iter()
        .map(|n| {
            let mut json = n.to_json();
            if let Some(sender) = n.sender.and_then(|id| senders.get(&id)) {
                json["sender"] = serde_json::json!(sender);
            }
            json
        })
        .collect())
}

async fn find_owned(
    db: &MongoDB,
    user_id: &ObjectId,
    notification_id: &ObjectId,
    action: &str,
) -> Result<Notification, AppError> {
    let notification = db
        .collection::<Notification>(NOTIFICATIONS)
        .find_one(doc! { "_id": notification_id })
        .await?
        .ok_or_else(|| AppError::not_found("Notification not found"))?;

    if &notification.recipient != user_id {
        return Err(AppError::forbidden(format!(
            "Not authorized to {} this notification",
            action
        )));
    }
    Ok(notification)
}

pub async fn mark_read(
    db: &MongoDB,
    user_id: &ObjectId,
    notification_id: &ObjectId,
) -> Result<(), AppError> {
    find_owned(db, user_id, notification_id, "mark").await?;
    db.collection::<Notification>(NOTIFICATIONS)
        .update_one(doc! { "_id": notification_id }, doc! { "$set": { "read": true } })
        .await?;
    Ok(())
}

pub async fn mark_all_read(db: &MongoDB, user_id: &ObjectId) -> Result<u64, AppError> {
    let result = db
        .collection::<Notification>(NOTIFICATIONS)
        .update_many(
            doc! { "recipient": user_id, "read": false },
            doc! { "$set": { "read": true } },
        )
        .await?;
    Ok(result.modified_count)
}

pub async fn delete(
    db: &MongoDB,
    user_id: &ObjectId,
    notification_id: &ObjectId,
) -> Result<(), AppError> {
    find_owned(db, user_id, notification_id, "delete").await?;
    db.collection::<Notification>(NOTIFICATIONS)
        .delete_one(doc! { "_id": notification_id })
        .await?;
    Ok(())
}
