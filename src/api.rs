use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Response envelope shared by every endpoint: `{success, message, data?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_data(message: &str, data: T) -> Self {
        ApiResponse {
            success: true,
            message: message.to_owned(),
            data: Some(data),
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn message_only(message: &str) -> Self {
        ApiResponse {
            success: true,
            message: message.to_owned(),
            data: None,
        }
    }

    pub fn failure(message: &str) -> Self {
        ApiResponse {
            success: false,
            message: message.to_owned(),
            data: None,
        }
    }
}

pub fn ok<T: Serialize>(message: &str, data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::with_data(message, data))).into_response()
}

pub fn ok_message(message: &str) -> Response {
    (StatusCode::OK, Json(ApiResponse::message_only(message))).into_response()
}

pub fn created<T: Serialize>(message: &str, data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::with_data(message, data))).into_response()
}

/// Runs the `validator` rules on a request payload and folds the report into
/// the envelope's failure message.
pub fn validate_payload<T: Validate>(payload: &T) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string().replace('\n', ", ")))
}

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
    pub offset: u32,
}

impl PageParams {
    pub fn resolve(&self) -> Page {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Page {
            page,
            limit,
            offset: (page - 1) * limit,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: Page, total: u64) -> Self {
        let total_pages = (total as f64 / page.limit as f64).ceil() as u32;
        Pagination {
            current_page: page.page,
            total_pages,
            total,
            has_next: u64::from(page.page) * u64::from(page.limit) < total,
            has_prev: page.page > 1,
        }
    }
}
