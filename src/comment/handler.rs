use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use super::{CommentPayload, Comments, UpdateComment};
use crate::account::Accounts;
use crate::api::{self, PageParams, Pagination};
use crate::auth::AuthUser;
use crate::catalog::Catalog;
use crate::error::{AppError, AppResult};
use crate::handler::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub rating: Option<i64>,
    pub book_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListParams {
    pub book_id: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    if let Some(book_id) = &payload.book_id {
        Catalog::new(&state.db)
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
    }

    let user = Accounts::new(&state.db)
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let comment = Comments::new(&state.db)
        .create(
            &user,
            payload.book_id,
            CommentPayload {
                content: payload.content,
                rating: payload.rating,
            },
        )
        .await?;
    Ok(api::created("Comment added successfully", comment))
}

pub async fn list_comments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<CommentListParams>,
) -> AppResult<Response> {
    auth.require_admin()?;

    let page = PageParams {
        page: params.page,
        limit: params.limit,
    }
    .resolve();
    let (comments, total) = Comments::new(&state.db)
        .list(params.book_id.as_deref(), params.user_id.as_deref(), page)
        .await?;

    Ok(api::ok(
        "Comments retrieved successfully",
        json!({
            "comments": comments,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn my_comments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    let page = params.resolve();
    let (comments, total) = Comments::new(&state.db)
        .list(None, Some(&auth.id), page)
        .await?;

    Ok(api::ok(
        "Comments retrieved successfully",
        json!({
            "comments": comments,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let comment = Comments::new(&state.db)
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
    Ok(api::ok("Comment retrieved successfully", comment))
}

pub async fn update_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateComment>,
) -> AppResult<Response> {
    let comments = Comments::new(&state.db);
    let existing = comments
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
    if existing.user_id != auth.id {
        return Err(AppError::Forbidden);
    }

    let comment = comments.update(&id, payload).await?;
    Ok(api::ok("Comment updated successfully", comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let comments = Comments::new(&state.db);
    let existing = comments
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
    if !auth.is_admin() && existing.user_id != auth.id {
        return Err(AppError::Forbidden);
    }

    comments.delete(&id).await?;
    Ok(api::ok_message("Comment deleted successfully"))
}
