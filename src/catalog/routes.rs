use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list_books))
        .route("/", post(handler::create_book))
        .route("/meta/categories", get(handler::get_categories))
        .route("/meta/popular", get(handler::get_popular))
        .route("/:id", get(handler::get_book))
        .route("/:id", put(handler::update_book))
        .route("/:id", delete(handler::delete_book))
        .route("/:id/comments", get(handler::get_book_comments))
        .route("/:id/comments", post(handler::add_book_comment))
}
