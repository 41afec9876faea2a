use axum::extract::State;
use axum::routing::put;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::{AppPath, CurrentUser};
use crate::graph::RelationOp;
use crate::routes::MessageResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/addFriend/{id}", put(add_friend))
        .route("/cancelRequest/{id}", put(cancel_request))
        .route("/acceptRequest/{id}", put(accept_request))
        .route("/deleteRequest/{id}", put(delete_request))
        .route("/follow/{id}", put(follow))
        .route("/unfollow/{id}", put(unfollow))
        .route("/unfriend/{id}", put(unfriend))
}

async fn apply(
    state: &AppState,
    user: &CurrentUser,
    target: &str,
    op: RelationOp,
) -> AppResult<Json<MessageResponse>> {
    let applied = state.graph.apply(op, user.id(), target).await?;
    Ok(Json(MessageResponse::new(applied.op.success_message())))
}

async fn add_friend(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::SendRequest).await
}

async fn cancel_request(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::CancelRequest).await
}

async fn accept_request(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::AcceptRequest).await
}

async fn delete_request(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::DeleteRequest).await
}

async fn follow(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::Follow).await
}

async fn unfollow(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::Unfollow).await
}

async fn unfriend(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    apply(&state, &user, &id, RelationOp::Unfriend).await
}
