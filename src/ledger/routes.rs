use axum::{
    Router,
    routing::{get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handler::checkout))
        .route("/", get(handler::list_transactions))
        .route("/my-transactions", get(handler::my_transactions))
        .route("/return-book", post(handler::return_book))
        .route("/stats/overview", get(handler::stats))
        .route("/:id", get(handler::get_transaction))
        .route("/:id/status", put(handler::update_transaction_status))
}
