use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::Accounts;
use crate::api::{self, validate_payload};
use crate::auth::{self, AuthUser};
use crate::catalog::Catalog;
use crate::error::{AppError, AppResult};
use crate::handler::AppState;
use crate::helpers;
use crate::model::{CartItem, ItemKind, Role, User};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 50))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub phone_number: String,
    #[validate(length(min = 6))]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 2, max = 50))]
    pub last_name: Option<String>,
    #[validate(length(min = 1))]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub book_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Response> {
    validate_payload(&payload)?;

    let accounts = Accounts::new(&state.db);
    let email = payload.email.to_lowercase();
    if accounts.find_by_email(&email).await?.is_some() {
        return Err(AppError::Validation(
            "User already exists with this email".to_string(),
        ));
    }

    let role = match payload.role.as_deref() {
        Some(raw) => Role::from_str(raw)
            .ok_or_else(|| AppError::Validation("Invalid role value".to_string()))?,
        None => Role::User,
    };

    let now = Utc::now();
    let user = User {
        id: helpers::generate_user_id(),
        first_name: payload.first_name,
        last_name: payload.last_name,
        email,
        phone_number: payload.phone_number,
        password_hash: auth::hash_password(&payload.password)?,
        role,
        brought_books: vec![],
        borrowed_books: vec![],
        transaction_history: vec![],
        comments: vec![],
        appointments: vec![],
        cart: vec![],
        created_at: now,
        updated_at: now,
    };
    accounts.insert_user(&user).await?;

    let token = state.auth.sign(&user)?;
    tracing::info!(user_id = %user.id, "user registered");
    Ok(api::created(
        "User registered successfully",
        json!({ "user": user, "token": token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    validate_payload(&payload)?;

    let accounts = Accounts::new(&state.db);
    // Same message for unknown email and bad password.
    let invalid = || AppError::Validation("Invalid email or password".to_string());
    let user = accounts
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(invalid)?;
    if !auth::verify_password(&payload.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = state.auth.sign(&user)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(api::ok(
        "Login successful",
        json!({ "user": user, "token": token }),
    ))
}

pub async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    let user = Accounts::new(&state.db)
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(api::ok("Profile retrieved successfully", user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Response> {
    validate_payload(&payload)?;

    let accounts = Accounts::new(&state.db);
    let mut user = accounts
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(first_name) = payload.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = payload.last_name {
        user.last_name = last_name;
    }
    if let Some(phone_number) = payload.phone_number {
        user.phone_number = phone_number;
    }
    user.updated_at = Utc::now();
    accounts.replace_user(&user).await?;

    Ok(api::ok("Profile updated successfully", user))
}

pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    auth.require_admin()?;
    let users = Accounts::new(&state.db).list_users().await?;
    Ok(api::ok("Users retrieved successfully", users))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    if !auth.is_admin() && auth.id != id {
        return Err(AppError::Forbidden);
    }

    let user = Accounts::new(&state.db)
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(api::ok("User retrieved successfully", user))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Response> {
    let kind = ItemKind::from_str(&payload.kind)
        .ok_or_else(|| AppError::Validation("Invalid transaction type".to_string()))?;

    let book = Catalog::new(&state.db)
        .get_book(&payload.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

    let accounts = Accounts::new(&state.db);
    let mut user = accounts
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    // At most one cart entry per (book, kind) pair.
    if user
        .cart
        .iter()
        .any(|item| item.book_id == book.id && item.kind == kind)
    {
        return Err(AppError::Validation("Item already in cart".to_string()));
    }

    let cart_item = CartItem {
        book_id: book.id.clone(),
        title: book.title.clone(),
        author: book.author.clone(),
        price: match kind {
            ItemKind::Buy => book.price,
            ItemKind::Borrow => book.rent,
        },
        image: book.image.clone(),
        kind,
        added_at: Utc::now(),
    };
    user.cart.push(cart_item.clone());
    user.updated_at = Utc::now();
    accounts.replace_user(&user).await?;

    Ok(api::ok("Item added to cart successfully", cart_item))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((book_id, kind)): Path<(String, String)>,
) -> AppResult<Response> {
    let kind = ItemKind::from_str(&kind)
        .ok_or_else(|| AppError::Validation("Invalid transaction type".to_string()))?;

    let accounts = Accounts::new(&state.db);
    let mut user = accounts
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    user.cart
        .retain(|item| !(item.book_id == book_id && item.kind == kind));
    user.updated_at = Utc::now();
    accounts.replace_user(&user).await?;

    Ok(api::ok_message("Item removed from cart successfully"))
}

pub async fn get_cart(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    let user = Accounts::new(&state.db)
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let catalog = Catalog::new(&state.db);
    let mut books = Vec::with_capacity(user.cart.len());
    for item in &user.cart {
        if let Some(book) = catalog.get_book(&item.book_id).await? {
            books.push(book);
        }
    }
    let total = helpers::cart_total(&user.cart, &books);

    Ok(api::ok(
        "Cart retrieved successfully",
        json!({
            "items": user.cart,
            "total": total,
            "itemCount": user.cart.len(),
        }),
    ))
}

pub async fn clear_cart(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    let accounts = Accounts::new(&state.db);
    let mut user = accounts
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    user.cart.clear();
    user.updated_at = Utc::now();
    accounts.replace_user(&user).await?;

    Ok(api::ok_message("Cart cleared successfully"))
}
