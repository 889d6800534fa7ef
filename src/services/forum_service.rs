use std::collections::HashMap;

use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};

use crate::{
    database::{MongoDB, FORUM_CATEGORIES, FORUM_POSTS, FORUM_THREADS},
    models::{
        notification, slugify, thread_slug, ForumCategory, ForumPost, ForumThread, Notification,
        UserSummary, WebRank,
    },
    realtime::EventHub,
    services::{
        auth_service::find_user, notification_service, parse_object_id,
        social_service::load_summaries,
    },
    utils::{error::AppError, time::to_iso},
};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// 1-based page and a page size within `1..=MAX_PAGE_SIZE`.
    pub fn resolve(&self) -> (i64, i64) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = match self.limit {
            Some(n) if n > 0 => n.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        (page, limit)
    }

    /// Documents to skip for the resolved page. Saturates instead of overflowing.
    pub fn offset(&self) -> u64 {
        let (page, limit) = self.resolve();
        (page - 1).saturating_mul(limit) as u64
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_count: Option<u64>,
}

impl From<&ForumCategory> for CategoryView {
    fn from(category: &ForumCategory) -> Self {
        CategoryView {
            id: category.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: category.name.clone(),
            slug: category.slug.clone(),
            description: category.description.clone(),
            order: category.order,
            thread_count: None,
            post_count: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub category: String,
    pub author: Option<UserSummary>,
    pub content: String,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub views: i64,
    pub reply_count: i64,
    pub last_activity: String,
    pub created_at: String,
}

impl ThreadView {
    fn new(thread: &ForumThread, author: Option<UserSummary>) -> Self {
        ThreadView {
            id: thread.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: thread.title.clone(),
            slug: thread.slug.clone(),
            category: thread.category.to_hex(),
            author,
            content: thread.content.clone(),
            is_pinned: thread.is_pinned,
            is_locked: thread.is_locked,
            views: thread.views,
            reply_count: thread.reply_count,
            last_activity: to_iso(thread.last_activity),
            created_at: to_iso(thread.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub thread: String,
    pub author: Option<UserSummary>,
    pub content: String,
    pub likes: usize,
    pub created_at: String,
}

impl PostView {
    fn new(post: &ForumPost, author: Option<UserSummary>) -> Self {
        PostView {
            id: post.id.map(|id| id.to_hex()).unwrap_or_default(),
            thread: post.thread.to_hex(),
            author,
            content: post.content.clone(),
            likes: post.likes.len(),
            created_at: to_iso(post.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_posts: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total_posts: u64) -> Self {
        let per_page = limit.max(1) as u64;
        Pagination {
            page,
            limit,
            total_posts,
            total_pages: total_posts.div_ceil(per_page),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryPage {
    pub category: CategoryView,
    pub threads: Vec<ThreadView>,
}

#[derive(Debug, Serialize)]
pub struct ThreadPage {
    pub thread: ThreadView,
    pub posts: Vec<PostView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ThreadRef {
    pub id: String,
    pub slug: String,
    pub title: String,
}

pub fn validate_thread(request: &CreateThreadRequest) -> Result<ObjectId, AppError> {
    let title_len = request.title.trim().chars().count();
    if !(3..=100).contains(&title_len) {
        return Err(AppError::invalid("Title must be between 3 and 100 characters"));
    }
    if request.content.trim().chars().count() < 10 {
        return Err(AppError::invalid("Content must be at least 10 characters"));
    }
    if request.category_id.trim().is_empty() {
        return Err(AppError::invalid("Category ID is required"));
    }
    parse_object_id(&request.category_id, "category")
}

pub fn validate_category(request: &CreateCategoryRequest) -> Result<String, AppError> {
    let name_len = request.name.trim().chars().count();
    if !(3..=50).contains(&name_len) {
        return Err(AppError::invalid("Name must be between 3 and 50 characters"));
    }
    if request.description.chars().count() > 200 {
        return Err(AppError::invalid("Description cannot be more than 200 characters"));
    }
    let slug = slugify(&request.name);
    if slug.is_empty() {
        return Err(AppError::invalid("Name must contain letters or digits"));
    }
    Ok(slug)
}

async fn authors(db: &MongoDB, ids: impl Iterator<Item = ObjectId>) -> Result<HashMap<ObjectId, UserSummary>, AppError> {
    let mut ids: Vec<ObjectId> = ids.collect();
    ids.sort();
    ids.dedup();
    load_summaries(db, &ids).await
}

/// Active categories by `order`, with thread and post counts.
pub async fn list_categories(db: &MongoDB) -> Result<Vec<CategoryView>, AppError> {
    let categories: Vec<ForumCategory> = db
        .collection::<ForumCategory>(FORUM_CATEGORIES)
        .find(doc! { "isActive": true })
        .sort(doc! { "order": 1 })
        .await?
        .try_collect()
        .await?;

    let threads = db.collection::<Document>(FORUM_THREADS);
    let posts = db.collection::<ForumPost>(FORUM_POSTS);
    let mut views = Vec::with_capacity(categories.len());

    for category in &categories {
        let found: Vec<Document> = threads
            .find(doc! { "category": category.id })
            .projection(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;
        let thread_ids: Vec<ObjectId> = found
            .iter()
            .filter_map(|t| t.get_object_id("_id").ok())
            .collect();

        let post_count = posts
            .count_documents(doc! { "thread": { "$in": &thread_ids } })
            .await?;

        let mut view = CategoryView::from(category);
        view.thread_count = Some(thread_ids.len() as u64);
        view.post_count = Some(post_count);
        views.push(view);
    }

    Ok(views)
}

pub async fn category_with_threads(db: &MongoDB, slug: &str) -> Result<CategoryPage, AppError> {
    let category = db
        .collection::<ForumCategory>(FORUM_CATEGORIES)
        .find_one(doc! { "slug": slug, "isActive": true })
        .await?
        .ok_or_else(|| AppError::not_found("Category not found"))?;

    let threads: Vec<ForumThread> = db
        .collection::<ForumThread>(FORUM_THREADS)
        .find(doc! { "category": category.id })
        .sort(doc! { "isPinned": -1, "lastActivity": -1 })
        .await?
        .try_collect()
        .await?;

    let authors = authors(db, threads.iter().map(|t| t.author)).await?;
    Ok(CategoryPage {
        category: CategoryView::from(&category),
        threads: threads
            .iter()
            .map(|t| ThreadView::new(t, authors.get(&t.author).cloned()))
            .collect(),
    })
}

/// Counts the view and returns one page of posts, oldest first.
pub async fn thread_with_posts(
    db: &MongoDB,
    slug: &str,
    query: &PageQuery,
) -> Result<ThreadPage, AppError> {
    let (page, limit) = query.resolve();
    let skip = query.offset();

    let thread = db
        .collection::<ForumThread>(FORUM_THREADS)
        .find_one_and_update(doc! { "slug": slug }, doc! { "$inc": { "views": 1 } })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Thread not found"))?;
    let thread_id = thread
        .id
        .ok_or_else(|| AppError::Internal("Thread document without _id".into()))?;

    let posts_collection = db.collection::<ForumPost>(FORUM_POSTS);
    let posts: Vec<ForumPost> = posts_collection
        .find(doc! { "thread": thread_id })
        .sort(doc! { "createdAt": 1 })
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;
    let total_posts = posts_collection
        .count_documents(doc! { "thread": thread_id })
        .await?;

    let authors = authors(
        db,
        posts.iter().map(|p| p.author).chain(std::iter::once(thread.author)),
    )
    .await?;

    Ok(ThreadPage {
        thread: ThreadView::new(&thread, authors.get(&thread.author).cloned()),
        posts: posts
            .iter()
            .map(|p| PostView::new(p, authors.get(&p.author).cloned()))
            .collect(),
        pagination: Pagination::new(page, limit, total_posts),
    })
}

/// Creates the thread and its opening post.
pub async fn create_thread(
    db: &MongoDB,
    author: &ObjectId,
    request: CreateThreadRequest,
) -> Result<ThreadRef, AppError> {
    let category_id = validate_thread(&request)?;
    db.collection::<ForumCategory>(FORUM_CATEGORIES)
        .find_one(doc! { "_id": category_id, "isActive": true })
        .await?
        .ok_or_else(|| AppError::not_found("Category not found"))?;

    let id = ObjectId::new();
    let title = request.title.trim().to_string();
    let now = BsonDateTime::now();
    let thread = ForumThread {
        id: Some(id),
        title: title.clone(),
        slug: thread_slug(&title, &id),
        category: category_id,
        author: *author,
        content: request.content.clone(),
        is_pinned: false,
        is_locked: false,
        views: 0,
        reply_count: 0,
        last_activity: now,
        created_at: now,
    };
    db.collection::<ForumThread>(FORUM_THREADS)
        .insert_one(&thread)
        .await?;

    let opening = ForumPost {
        id: None,
        thread: id,
        author: *author,
        content: request.content,
        likes: Vec::new(),
        created_at: now,
    };
    db.collection::<ForumPost>(FORUM_POSTS)
        .insert_one(&opening)
        .await?;

    log::info!("🧵 Thread '{}' created by {}", thread.slug, author);
    Ok(ThreadRef {
        id: id.to_hex(),
        slug: thread.slug,
        title,
    })
}

pub fn ensure_can_reply(thread: &ForumThread, rank: &WebRank) -> Result<(), AppError> {
    if thread.is_locked && !rank.is_staff() {
        return Err(AppError::forbidden("Thread is locked"));
    }
    Ok(())
}

/// Replies to a thread. Locked threads only take replies from staff.
pub async fn create_post(
    db: &MongoDB,
    hub: &EventHub,
    author_id: &ObjectId,
    request: CreatePostRequest,
) -> Result<PostView, AppError> {
    if request.content.trim().is_empty() {
        return Err(AppError::invalid("Content is required"));
    }
    let thread_id = parse_object_id(&request.thread_id, "thread")?;

    let threads = db.collection::<ForumThread>(FORUM_THREADS);
    let thread = threads
        .find_one(doc! { "_id": thread_id })
        .await?
        .ok_or_else(|| AppError::not_found("Thread not found"))?;

    let author = find_user(db, author_id).await?;
    ensure_can_reply(&thread, &author.web_rank)?;

    let mut post = ForumPost {
        id: None,
        thread: thread_id,
        author: *author_id,
        content: request.content,
        likes: Vec::new(),
        created_at: BsonDateTime::now(),
    };
    let result = db
        .collection::<ForumPost>(FORUM_POSTS)
        .insert_one(&post)
        .await?;
    post.id = result.inserted_id.as_object_id();

    threads
        .update_one(
            doc! { "_id": thread_id },
            doc! {
                "$inc": { "replyCount": 1 },
                "$set": { "lastActivity": post.created_at },
            },
        )
        .await?;

    if &thread.author != author_id {
        let note = Notification::new(
            thread.author,
            Some(*author_id),
            notification::FORUM_REPLY,
            format!("{} replied to your thread \"{}\"", author.username, thread.title),
        )
        .with_data(doc! { "threadSlug": &thread.slug });
        if let Err(e) = notification_service::create(db, hub, note).await {
            log::warn!("⚠️  Reply notification not stored: {}", e);
        }
    }

    Ok(PostView::new(&post, Some(UserSummary::from(&author))))
}

/// Adds the user's like. Returns the new like count.
pub async fn like_post(db: &MongoDB, user_id: &ObjectId, post_id: &ObjectId) -> Result<usize, AppError> {
    let posts = db.collection::<ForumPost>(FORUM_POSTS);
    let updated = posts
        .find_one_and_update(
            doc! { "_id": post_id, "likes": { "$ne": user_id } },
            doc! { "$addToSet": { "likes": user_id } },
        )
        .return_document(ReturnDocument::After)
        .await?;

    match updated {
        Some(post) => Ok(post.likes.len()),
        None => match posts.find_one(doc! { "_id": post_id }).await? {
            Some(_) => Err(AppError::invalid("You already liked this post")),
            None => Err(AppError::not_found("Post not found")),
        },
    }
}

/// Removes the user's like. Returns the new like count.
pub async fn unlike_post(db: &MongoDB, user_id: &ObjectId, post_id: &ObjectId) -> Result<usize, AppError> {
    let posts = db.collection::<ForumPost>(FORUM_POSTS);
    let updated = posts
        .find_one_and_update(
            doc! { "_id": post_id, "likes": user_id },
            doc! { "$pull": { "likes": user_id } },
        )
        .return_document(ReturnDocument::After)
        .await?;

    match updated {
        Some(post) => Ok(post.likes.len()),
        None => match posts.find_one(doc! { "_id": post_id }).await? {
            Some(_) => Err(AppError::invalid("You have not liked this post")),
            None => Err(AppError::not_found("Post not found")),
        },
    }
}

/// Staff only. A taken slug surfaces as a duplicate-key 400.
pub async fn create_category(
    db: &MongoDB,
    user_id: &ObjectId,
    request: CreateCategoryRequest,
) -> Result<CategoryView, AppError> {
    let user = find_user(db, user_id).await?;
    if !user.web_rank.is_staff() {
        return Err(AppError::forbidden("Not authorized to create forum categories"));
    }
    let slug = validate_category(&request)?;

    let mut category = ForumCategory {
        id: None,
        name: request.name.trim().to_string(),
        slug,
        description: request.description,
        order: request.order,
        is_active: true,
        created_at: BsonDateTime::now(),
    };
    let result = db
        .collection::<ForumCategory>(FORUM_CATEGORIES)
        .insert_one(&category)
        .await?;
    category.id = result.inserted_id.as_object_id();

    log::info!("🗂️  Forum category '{}' created by {}", category.slug, user.username);
    Ok(CategoryView::from(&category))
}
