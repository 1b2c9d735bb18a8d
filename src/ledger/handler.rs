use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use super::{CheckoutRequest, Ledger};
use crate::api::{self, PageParams, Pagination, validate_payload};
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handler::AppState;
use crate::model::TransactionStatus;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListParams {
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBookRequest {
    pub book_id: Option<String>,
}

pub async fn checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Response> {
    validate_payload(&payload)?;

    let outcome = Ledger::new(&state.db)
        .checkout(&auth.id, &payload.items, payload.payment_method)
        .await?;
    tracing::info!(
        user_id = %auth.id,
        reference = %outcome.reference,
        total = outcome.total_amount,
        "checkout completed"
    );
    Ok(api::created("Checkout completed successfully", outcome))
}

fn parse_status(raw: &str) -> AppResult<TransactionStatus> {
    TransactionStatus::from_str(raw)
        .ok_or_else(|| AppError::Validation("Invalid status value".to_string()))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<TransactionListParams>,
) -> AppResult<Response> {
    auth.require_admin()?;

    let status = match params.status.as_deref() {
        Some(raw) if !raw.is_empty() && raw != "all" => Some(parse_status(raw)?),
        _ => None,
    };
    let page = PageParams {
        page: params.page,
        limit: params.limit,
    }
    .resolve();
    let (transactions, total) = Ledger::new(&state.db)
        .list(status, params.user_id.as_deref(), page)
        .await?;

    Ok(api::ok(
        "Transactions retrieved successfully",
        json!({
            "transactions": transactions,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn my_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    let page = params.resolve();
    let (transactions, total) = Ledger::new(&state.db)
        .list(None, Some(&auth.id), page)
        .await?;

    Ok(api::ok(
        "Transactions retrieved successfully",
        json!({
            "transactions": transactions,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let transaction = Ledger::new(&state.db)
        .get_transaction(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    if !auth.is_admin() && transaction.user_id != auth.id {
        return Err(AppError::Forbidden);
    }

    Ok(api::ok("Transaction retrieved successfully", transaction))
}

pub async fn update_transaction_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Response> {
    auth.require_admin()?;

    let status = parse_status(&payload.status)?;
    let transaction = Ledger::new(&state.db).update_status(&id, status).await?;
    Ok(api::ok("Transaction status updated successfully", transaction))
}

pub async fn return_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ReturnBookRequest>,
) -> AppResult<Response> {
    let book_id = payload
        .book_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("Book ID is required".to_string()))?;

    let outcome = Ledger::new(&state.db).return_book(&auth.id, &book_id).await?;
    tracing::info!(user_id = %auth.id, book_id = %book_id, "book returned");
    Ok(api::ok("Book returned successfully", outcome))
}

pub async fn stats(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    auth.require_admin()?;
    let stats = Ledger::new(&state.db).stats().await?;
    Ok(api::ok("Transaction statistics retrieved successfully", stats))
}
