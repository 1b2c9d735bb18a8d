use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use super::{Catalog, CreateBook, UpdateBook, average_rating};
use crate::account::Accounts;
use crate::api::{self, PageParams, Pagination, validate_payload};
use crate::auth::AuthUser;
use crate::comment::{CommentPayload, Comments};
use crate::error::{AppError, AppResult};
use crate::handler::AppState;

#[derive(Debug, Deserialize)]
pub struct BookListParams {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<BookListParams>,
) -> AppResult<Response> {
    let page = PageParams {
        page: params.page,
        limit: params.limit,
    }
    .resolve();
    let category = params
        .category
        .as_deref()
        .filter(|c| !c.is_empty() && *c != "all");

    let catalog = Catalog::new(&state.db);
    let (books, total) = catalog
        .list_books(category, params.search.as_deref(), page)
        .await?;

    Ok(api::ok(
        "Books retrieved successfully",
        json!({
            "books": books,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let catalog = Catalog::new(&state.db);
    let book = catalog
        .get_book(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
    Ok(api::ok("Book retrieved successfully", book))
}

pub async fn create_book(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBook>,
) -> AppResult<Response> {
    user.require_admin()?;
    validate_payload(&payload)?;

    let catalog = Catalog::new(&state.db);
    let book = catalog.create_book(payload).await?;
    tracing::info!(book_id = %book.id, "book added to catalog");
    Ok(api::created("Book added successfully", book))
}

pub async fn update_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBook>,
) -> AppResult<Response> {
    user.require_admin()?;
    validate_payload(&payload)?;

    let catalog = Catalog::new(&state.db);
    let book = catalog.update_book(&id, payload).await?;
    Ok(api::ok("Book updated successfully", book))
}

pub async fn delete_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    user.require_admin()?;

    let catalog = Catalog::new(&state.db);
    catalog.delete_book(&id).await?;
    Ok(api::ok_message("Book deleted successfully"))
}

pub async fn add_book_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<CommentPayload>,
) -> AppResult<Response> {
    let catalog = Catalog::new(&state.db);
    let book = catalog
        .get_book(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

    // One comment per user per book.
    if book.comments.iter().any(|c| c.user_id == auth.id) {
        return Err(AppError::Validation(
            "You have already commented on this book".to_string(),
        ));
    }

    let user = Accounts::new(&state.db)
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let comments = Comments::new(&state.db);
    let comment = comments.create(&user, Some(id), payload).await?;
    Ok(api::created("Comment added successfully", comment))
}

pub async fn get_book_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let catalog = Catalog::new(&state.db);
    let book = catalog
        .get_book(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

    Ok(api::ok(
        "Comments retrieved successfully",
        json!({
            "comments": book.comments,
            "totalComments": book.comments.len(),
            "averageRating": average_rating(&book.comments),
        }),
    ))
}

pub async fn get_categories(State(state): State<AppState>) -> AppResult<Response> {
    let catalog = Catalog::new(&state.db);
    let categories = catalog.categories().await?;
    Ok(api::ok("Categories retrieved successfully", categories))
}

pub async fn get_popular(State(state): State<AppState>) -> AppResult<Response> {
    let catalog = Catalog::new(&state.db);
    let books = catalog.popular(10).await?;
    Ok(api::ok("Popular books retrieved successfully", books))
}
