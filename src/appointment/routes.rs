use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::create_appointment))
        .route("/", get(handler::list_appointments))
        .route("/my-appointments", get(handler::my_appointments))
        .route("/stats/overview", get(handler::stats))
        .route("/:id", get(handler::get_appointment))
        .route("/:id", put(handler::update_appointment))
        .route("/:id", delete(handler::delete_appointment))
        .route("/:id/status", put(handler::update_appointment_status))
}
