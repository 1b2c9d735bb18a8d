use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::create_comment))
        .route("/", get(handler::list_comments))
        .route("/my-comments", get(handler::my_comments))
        .route("/:id", get(handler::get_comment))
        .route("/:id", put(handler::update_comment))
        .route("/:id", delete(handler::delete_comment))
}
