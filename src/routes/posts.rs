use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::models::{Comment, Post, PostKind, ReactionKind, SavedPost};
use crate::error::{AppError, AppResult};
use crate::extractors::{AppJson, AppPath, CurrentUser};
use crate::posts::repository as posts;
use crate::posts::{feed, NewPost, ReactionSummary};
use crate::state::AppState;

// --- Requests ---

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(rename = "type")]
    pub kind: Option<PostKind>,
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub background: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub post_id: String,
    #[serde(default)]
    pub comment: String,
    pub image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactRequest {
    pub post_id: String,
    pub react: ReactionKind,
}

// --- Responses ---

#[derive(Serialize)]
pub struct SaveResponse {
    pub saved: bool,
}

#[derive(Serialize)]
pub struct ReactResponse {
    pub react: Option<ReactionKind>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/getPublicPosts", get(public_posts))
        .route("/createPost", post(create_post))
        .route("/getAllPosts", get(home_feed))
        .route("/comment", put(comment))
        .route("/savePost/{id}", put(save_post))
        .route("/getSavedPosts", get(saved_posts))
        .route("/deletePost/{id}", delete(delete_post))
        .route("/reactPost", put(react_post))
        .route("/getReacts/{id}", get(get_reacts))
}

// --- Handlers ---

async fn public_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    Ok(Json(feed::public_feed(&conn, Utc::now())?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreatePostRequest>,
) -> AppResult<Json<Post>> {
    if let Some(text) = &req.text {
        if text.chars().count() > 5000 {
            return Err(AppError::Validation(
                "Post text must be 5000 characters or less".into(),
            ));
        }
    }

    let new_post = NewPost {
        kind: req.kind,
        text: req.text,
        images: req.images,
        background: req.background,
    };
    let conn = state.db.get()?;
    Ok(Json(posts::create_post(&conn, user.id(), &new_post, Utc::now())?))
}

async fn home_feed(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    Ok(Json(feed::home_feed(&conn, user.id())?))
}

async fn comment(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CommentRequest>,
) -> AppResult<Json<Vec<Comment>>> {
    let conn = state.db.get()?;
    let comments = posts::add_comment(
        &conn,
        &req.post_id,
        user.id(),
        req.comment.trim(),
        req.image.as_deref(),
        Utc::now(),
    )?;
    Ok(Json(comments))
}

async fn save_post(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<SaveResponse>> {
    let conn = state.db.get()?;
    let saved = posts::toggle_saved(&conn, user.id(), &id, Utc::now())?;
    Ok(Json(SaveResponse { saved }))
}

async fn saved_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<SavedPost>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::saved_posts(&conn, user.id())?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<DeleteResponse>> {
    let conn = state.db.get()?;
    posts::delete_post(&conn, &id, user.id())?;
    Ok(Json(DeleteResponse { status: "ok" }))
}

async fn react_post(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<ReactRequest>,
) -> AppResult<Json<ReactResponse>> {
    let conn = state.db.get()?;
    let react = posts::react(&conn, &req.post_id, user.id(), req.react, Utc::now())?;
    Ok(Json(ReactResponse { react }))
}

async fn get_reacts(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<ReactionSummary>> {
    let conn = state.db.get()?;
    Ok(Json(posts::reaction_summary(&conn, &id, user.id())?))
}
