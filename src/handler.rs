use std::sync::Arc;

use axum::{Json, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::api::ApiResponse;
use crate::auth::AuthKeys;
use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub auth: Arc<AuthKeys>,
}

pub async fn service_info() -> impl IntoResponse {
    Json(ApiResponse::with_data(
        "libris API is running",
        json!({
            "timestamp": Utc::now(),
            "endpoints": {
                "users": "/api/users",
                "books": "/api/books",
                "transactions": "/api/transactions",
                "appointments": "/api/appointments",
                "comments": "/api/comments",
            },
        }),
    ))
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(ApiResponse::with_data(
        "Server is running",
        json!({
            "status": "OK",
            "timestamp": Utc::now(),
        }),
    ))
}
