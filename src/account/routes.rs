use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handler::register))
        .route("/login", post(handler::login))
        .route("/profile", get(handler::get_profile))
        .route("/profile", put(handler::update_profile))
        .route("/", get(handler::list_users))
        .route("/cart/add", post(handler::add_to_cart))
        .route("/cart/remove/:book_id/:kind", delete(handler::remove_from_cart))
        .route("/cart/items", get(handler::get_cart))
        .route("/cart/clear", delete(handler::clear_cart))
        .route("/:id", get(handler::get_user))
}
