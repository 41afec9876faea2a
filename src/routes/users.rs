use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::models::{Details, Post, PublicUser, SearchEntry, UserSummary};
use crate::error::{AppError, AppResult};
use crate::extractors::{AppJson, AppPath, CurrentUser};
use crate::graph::{friendship, Friendship, RelationList};
use crate::posts::repository as posts;
use crate::routes::MessageResponse;
use crate::state::AppState;
use crate::users::repository;

#[derive(Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Deserialize)]
pub struct DetailsRequest {
    pub infos: Details,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchUserRequest {
    pub search_user: String,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub friends: Vec<UserSummary>,
    pub posts: Vec<Post>,
    pub friendship: Friendship,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendsPage {
    pub friends: Vec<UserSummary>,
    pub requests: Vec<UserSummary>,
    pub sent_requests: Vec<UserSummary>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/getProfile/{username}", get(get_profile))
        .route("/updateProfilePicture", put(update_profile_picture))
        .route("/updateCover", put(update_cover))
        .route("/updateDetails", put(update_details))
        .route("/search/{term}", post(search))
        .route("/addToSearchHistory", put(add_to_search_history))
        .route("/getSearchHistory", get(get_search_history))
        .route("/removeFromSearch", put(remove_from_search))
        .route("/getFriendsPageInfos", get(get_friends_page))
}

fn require_url(url: &str) -> AppResult<&str> {
    let url = url.trim();
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url),
        _ => Err(AppError::Validation("A valid image URL is required.".into())),
    }
}

async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    AppPath(username): AppPath<String>,
) -> AppResult<Json<ProfileResponse>> {
    let (profile, friends, posts) = {
        let conn = state.db.get()?;
        let profile = repository::find_by_username(&conn, &username)?
            .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;
        let friends = repository::list_members(&conn, &profile.id, RelationList::Friends)?;
        let posts = posts::posts_by_user(&conn, &profile.id, None)?;
        (profile, friends, posts)
    };

    let viewer_lists = state.graph.load(&viewer.id).await?;
    let profile_lists = state.graph.load(&profile.id).await?;
    let friendship = match (viewer_lists, profile_lists) {
        (Some(v), Some(p)) => friendship(&v, &p),
        _ => Friendship::default(),
    };

    Ok(Json(ProfileResponse {
        user: profile.public(),
        friends,
        posts,
        friendship,
    }))
}

async fn update_profile_picture(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<UrlRequest>,
) -> AppResult<Json<String>> {
    let url = require_url(&req.url)?;
    let conn = state.db.get()?;
    repository::update_picture(&conn, user.id(), url)?;
    Ok(Json(url.to_string()))
}

async fn update_cover(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<UrlRequest>,
) -> AppResult<Json<String>> {
    let url = require_url(&req.url)?;
    let conn = state.db.get()?;
    repository::update_cover(&conn, user.id(), url)?;
    Ok(Json(url.to_string()))
}

async fn update_details(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<DetailsRequest>,
) -> AppResult<Json<Details>> {
    let conn = state.db.get()?;
    let details = repository::update_details(&conn, user.id(), &req.infos)?;
    Ok(Json(details))
}

async fn search(
    State(state): State<AppState>,
    _user: CurrentUser,
    AppPath(term): AppPath<String>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(repository::search_users(&conn, &term)?))
}

async fn add_to_search_history(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<SearchUserRequest>,
) -> AppResult<Json<MessageResponse>> {
    let conn = state.db.get()?;
    repository::add_search(&conn, user.id(), &req.search_user, Utc::now())?;
    Ok(Json(MessageResponse::new("Search history updated")))
}

async fn get_search_history(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<SearchEntry>>> {
    let conn = state.db.get()?;
    Ok(Json(repository::search_history(&conn, user.id())?))
}

async fn remove_from_search(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<SearchUserRequest>,
) -> AppResult<Json<MessageResponse>> {
    let conn = state.db.get()?;
    if !repository::remove_search(&conn, user.id(), &req.search_user)? {
        return Err(AppError::NotFound(
            "This user is not in your search history".into(),
        ));
    }
    Ok(Json(MessageResponse::new("Removed from search history")))
}

async fn get_friends_page(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<FriendsPage>> {
    let conn = state.db.get()?;
    Ok(Json(FriendsPage {
        friends: repository::list_members(&conn, user.id(), RelationList::Friends)?,
        requests: repository::list_members(&conn, user.id(), RelationList::Requests)?,
        sent_requests: repository::sent_requests(&conn, user.id())?,
    }))
}
