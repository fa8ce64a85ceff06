/// Knowledge base endpoints
use crate::{
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::{HubError, HubResult},
    knowledge::{Comment, FeedEntry, KnowledgeCategory, KnowledgePost},
    notify::channel,
};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build knowledge routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/knowledge/categories", post(create_category))
        .route("/api/knowledge/categories", get(list_categories))
        .route("/api/knowledge/categories/:id", delete(delete_category))
        .route("/api/knowledge/posts", post(create_post))
        .route("/api/knowledge/posts", get(list_posts))
        .route("/api/knowledge/posts/:id", get(get_post))
        .route("/api/knowledge/posts/:id", delete(delete_post))
        .route("/api/knowledge/posts/:id/endorse", post(endorse_post))
        .route("/api/knowledge/posts/:id/comments", post(create_comment))
        .route("/api/knowledge/posts/:id/comments", get(list_comments))
        .route("/api/feed", get(get_feed))
        .route("/api/feed/rebuild", post(rebuild_feed))
}

// ========== Categories ==========

#[derive(Debug, Deserialize, Validate)]
struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 200))]
    name: String,
    parent_id: Option<i64>,
}

async fn create_category(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Json(req): Json<CreateCategoryRequest>,
) -> HubResult<Json<KnowledgeCategory>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    Ok(Json(ctx.categories.create(&req.name, req.parent_id).await?))
}

async fn list_categories(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
) -> HubResult<Json<Vec<KnowledgeCategory>>> {
    Ok(Json(ctx.categories.list().await?))
}

async fn delete_category(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.categories.delete(id).await?;
    Ok(Json(serde_json::json!({})))
}

// ========== Posts ==========

#[derive(Debug, Deserialize, Validate)]
struct CreatePostRequest {
    #[validate(length(min = 1, max = 300))]
    title: String,
    #[validate(length(min = 1, max = 100_000))]
    body: String,
    category_id: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
}

async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreatePostRequest>,
) -> HubResult<Json<KnowledgePost>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let post = ctx
        .posts
        .create(
            &req.title,
            &req.body,
            &auth.employee_id,
            req.category_id,
            &req.tags,
        )
        .await?;

    // Fan out to topic subscribers
    for tag in &post.tags {
        let _ = ctx
            .notifications
            .broadcast(&channel::topic(tag), "knowledge", &post.title, None)
            .await;
    }

    Ok(Json(post))
}

#[derive(Debug, Deserialize)]
struct ListPostsQuery {
    category_id: Option<i64>,
    tag: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_posts(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Query(query): Query<ListPostsQuery>,
) -> HubResult<Json<Vec<KnowledgePost>>> {
    let posts = ctx
        .posts
        .list(query.category_id, query.tag.as_deref(), query.limit)
        .await?;
    Ok(Json(posts))
}

/// Reading a post also counts a view
async fn get_post(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<KnowledgePost>> {
    ctx.posts.record_view(id).await?;
    Ok(Json(ctx.posts.get(id).await?))
}

async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<serde_json::Value>> {
    let post = ctx.posts.get(id).await?;
    if post.author_id != auth.employee_id
        && !auth.role.can_act_as(crate::auth::Role::Moderator)
    {
        return Err(HubError::Authorization(
            "Only the author or a moderator can delete a post".to_string(),
        ));
    }

    ctx.posts.delete(id).await?;
    Ok(Json(serde_json::json!({})))
}

async fn endorse_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.posts.endorse(id, &auth.employee_id).await?;

    let post = ctx.posts.get(id).await?;
    let _ = ctx
        .notifications
        .notify(
            &post.author_id,
            "social",
            "Your post was endorsed",
            Some(&post.title),
        )
        .await;

    Ok(Json(serde_json::json!({ "endorsements": post.endorsement_count })))
}

// ========== Comments ==========

#[derive(Debug, Deserialize, Validate)]
struct CreateCommentRequest {
    #[validate(length(min = 1, max = 10_000))]
    body: String,
}

async fn create_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> HubResult<Json<Comment>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let comment = ctx.posts.comment(id, &auth.employee_id, &req.body).await?;

    let post = ctx.posts.get(id).await?;
    if post.author_id != auth.employee_id {
        let _ = ctx
            .notifications
            .notify(
                &post.author_id,
                "social",
                "New comment on your post",
                Some(&post.title),
            )
            .await;
    }

    Ok(Json(comment))
}

async fn list_comments(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<Vec<Comment>>> {
    Ok(Json(ctx.posts.comments(id).await?))
}

// ========== Feed ==========

#[derive(Debug, Deserialize)]
struct FeedQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

async fn get_feed(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<FeedQuery>,
) -> HubResult<Json<Vec<FeedEntry>>> {
    Ok(Json(ctx.feed.feed(&auth.employee_id, query.limit).await?))
}

async fn rebuild_feed(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<serde_json::Value>> {
    let written = ctx.feed.rebuild_for(&auth.employee_id, 200).await?;
    Ok(Json(serde_json::json!({ "entries": written })))
}
