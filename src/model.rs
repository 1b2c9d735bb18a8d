use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Buy,
    Borrow,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Buy => "buy",
            ItemKind::Borrow => "borrow",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(ItemKind::Buy),
            "borrow" => Some(ItemKind::Borrow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnedStatus {
    Purchased,
    Downloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Active,
    Returned,
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Successful,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Successful => "successful",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "successful" => Some(AppointmentStatus::Successful),
            _ => None,
        }
    }
}

/// A catalog entry. `available_copies` is the live stock counter mutated by
/// borrow checkouts and returns; it must stay within `0..=total_copies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: f64,
    pub rent: f64,
    pub image: String,
    pub pdf_url: String,
    pub category: String,
    pub total_copies: i64,
    pub available_copies: i64,
    pub comments: Vec<BookComment>,
    pub date_added: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment copy embedded on a book record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookComment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    pub rating: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub book_id: Option<String>,
    pub content: String,
    pub rating: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub price: f64,
    pub image: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub added_at: DateTime<Utc>,
}

/// Priced snapshot of one checkout item. Decoupled from the live book record
/// so historical totals never drift when prices change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub book_id: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub price: f64,
    pub image: String,
}

/// Ledger record. Immutable once written, except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub total_amount: f64,
    pub items: Vec<TransactionItem>,
    pub date: DateTime<Utc>,
    pub reference: String,
    pub status: TransactionStatus,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedBookEntry {
    pub id: String,
    pub title: String,
    pub author: String,
    pub image: String,
    pub price: f64,
    pub pdf_url: String,
    pub purchase_date: DateTime<Utc>,
    pub transaction_ref: String,
    pub status: OwnedStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowedBookEntry {
    pub id: String,
    pub title: String,
    pub author: String,
    pub image: String,
    pub price: f64,
    pub pdf_url: String,
    pub borrow_date: DateTime<Utc>,
    pub return_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_return_date: Option<DateTime<Utc>>,
    pub transaction_ref: String,
    pub status: BorrowStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub subject: String,
    pub details: String,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full account document. The embedded lists are denormalized copies kept in
/// sync by the workflows that own them; the ledger and catalog tables remain
/// the systems of record. The password digest never serializes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub brought_books: Vec<OwnedBookEntry>,
    pub borrowed_books: Vec<BorrowedBookEntry>,
    pub transaction_history: Vec<Transaction>,
    pub comments: Vec<Comment>,
    pub appointments: Vec<Appointment>,
    pub cart: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
