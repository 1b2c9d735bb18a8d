use chrono::{DateTime, Duration, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::account::Accounts;
use crate::api::Page;
use crate::catalog::Catalog;
use crate::db::{Database, decode_json, encode_json, format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::helpers;
use crate::model::{
    Book, BorrowStatus, BorrowedBookEntry, ItemKind, OwnedBookEntry, OwnedStatus, Transaction,
    TransactionItem, TransactionStatus,
};

const TRANSACTION_COLUMNS: &str =
    "id, user_id, total_amount, items, date, reference, status, payment_method";

const BORROW_PERIOD_DAYS: i64 = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub book_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CheckoutItem>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub transaction: Transaction,
    pub reference: String,
    pub total_amount: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOutcome {
    pub book_id: String,
    pub return_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_transactions: u64,
    pub completed_transactions: u64,
    pub pending_transactions: u64,
    pub failed_transactions: u64,
    pub total_revenue: f64,
    pub recent_transactions: Vec<Transaction>,
}

pub struct Ledger<'a> {
    db: &'a Database,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Ledger { db }
    }

    fn transaction_from_row(row: &Row) -> AppResult<Transaction> {
        let status_raw: String = row.get(6)?;
        let status = TransactionStatus::from_str(&status_raw).ok_or_else(|| {
            AppError::Store(anyhow::anyhow!("invalid transaction status: {status_raw}"))
        })?;
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            total_amount: row.get(2)?,
            items: decode_json(&row.get::<String>(3)?)?,
            date: parse_timestamp(&row.get::<String>(4)?)?,
            reference: row.get(5)?,
            status,
            payment_method: row.get(7)?,
        })
    }

    /// Converts a set of requested items into a committed transaction plus
    /// the account and catalog updates that go with it. Validation happens
    /// before any write; the writes run inside one database transaction.
    pub async fn checkout(
        &self,
        user_id: &str,
        items: &[CheckoutItem],
        payment_method: Option<String>,
    ) -> AppResult<CheckoutOutcome> {
        if items.is_empty() {
            return Err(AppError::Validation(
                "At least one item is required".to_string(),
            ));
        }

        let _guard = self.db.begin_write().await?;
        let result = self.checkout_inner(user_id, items, payment_method).await;
        self.db.finish_write(result).await
    }

    async fn checkout_inner(
        &self,
        user_id: &str,
        items: &[CheckoutItem],
        payment_method: Option<String>,
    ) -> AppResult<CheckoutOutcome> {
        let catalog = Catalog::new(self.db);
        let accounts = Accounts::new(self.db);

        // Validate every item and price the snapshot before touching anything.
        let mut total_amount = 0.0;
        let mut priced: Vec<(Book, ItemKind, f64)> = Vec::with_capacity(items.len());
        for item in items {
            let book = catalog.get_book(&item.book_id).await?.ok_or_else(|| {
                AppError::NotFound(format!("Book with ID {} not found", item.book_id))
            })?;

            if item.kind == ItemKind::Borrow && book.available_copies <= 0 {
                return Err(AppError::Unavailable(format!(
                    "Book \"{}\" is not available for borrowing",
                    book.title
                )));
            }

            let price = match item.kind {
                ItemKind::Buy => book.price,
                ItemKind::Borrow => book.rent,
            };
            total_amount += price;
            priced.push((book, item.kind, price));
        }

        let mut user = accounts
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let now = Utc::now();
        let reference = helpers::generate_transaction_reference(user_id);
        let transaction = Transaction {
            id: helpers::generate_transaction_id(),
            user_id: user_id.to_string(),
            total_amount,
            items: priced
                .iter()
                .map(|(book, kind, price)| TransactionItem {
                    book_id: book.id.clone(),
                    title: book.title.clone(),
                    author: book.author.clone(),
                    kind: *kind,
                    price: *price,
                    image: book.image.clone(),
                })
                .collect(),
            date: now,
            reference: reference.clone(),
            status: TransactionStatus::Completed,
            payment_method: payment_method.unwrap_or_else(|| "card".to_string()),
        };
        self.insert_transaction(&transaction).await?;

        user.transaction_history.push(transaction.clone());
        for (book, kind, price) in &priced {
            match kind {
                ItemKind::Buy => user.brought_books.push(OwnedBookEntry {
                    id: book.id.clone(),
                    title: book.title.clone(),
                    author: book.author.clone(),
                    image: book.image.clone(),
                    price: *price,
                    pdf_url: book.pdf_url.clone(),
                    purchase_date: now,
                    transaction_ref: reference.clone(),
                    status: OwnedStatus::Purchased,
                }),
                ItemKind::Borrow => {
                    user.borrowed_books.push(BorrowedBookEntry {
                        id: book.id.clone(),
                        title: book.title.clone(),
                        author: book.author.clone(),
                        image: book.image.clone(),
                        price: *price,
                        pdf_url: book.pdf_url.clone(),
                        borrow_date: now,
                        return_date: now + Duration::days(BORROW_PERIOD_DAYS),
                        actual_return_date: None,
                        transaction_ref: reference.clone(),
                        status: BorrowStatus::Active,
                    });

                    // The availability check above can be stale by the time
                    // we get here; the conditional decrement is the arbiter.
                    if !catalog.reserve_copy(&book.id).await? {
                        return Err(AppError::Conflict(format!(
                            "Book \"{}\" was claimed by a concurrent checkout",
                            book.title
                        )));
                    }
                }
            }
        }

        user.cart.clear();
        user.updated_at = now;
        accounts.replace_user(&user).await?;

        Ok(CheckoutOutcome {
            reference,
            total_amount,
            transaction,
        })
    }

    /// Flips one active borrow to returned and gives the copy back to the
    /// catalog. Never-borrowed and already-returned look the same from here:
    /// there is no active entry to find.
    pub async fn return_book(&self, user_id: &str, book_id: &str) -> AppResult<ReturnOutcome> {
        let _guard = self.db.begin_write().await?;
        let result = self.return_book_inner(user_id, book_id).await;
        self.db.finish_write(result).await
    }

    async fn return_book_inner(&self, user_id: &str, book_id: &str) -> AppResult<ReturnOutcome> {
        let catalog = Catalog::new(self.db);
        let accounts = Accounts::new(self.db);

        let mut user = accounts
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let now = Utc::now();
        let entry = user
            .borrowed_books
            .iter_mut()
            .find(|b| b.id == book_id && b.status == BorrowStatus::Active)
            .ok_or_else(|| AppError::NotFound("Active borrowed book not found".to_string()))?;
        entry.status = BorrowStatus::Returned;
        entry.actual_return_date = Some(now);

        catalog.release_copy(book_id).await?;

        user.updated_at = now;
        accounts.replace_user(&user).await?;

        Ok(ReturnOutcome {
            book_id: book_id.to_string(),
            return_date: now,
        })
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> AppResult<()> {
        let query = format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.db
            .connection()
            .execute(
                &query,
                libsql::params![
                    transaction.id.clone(),
                    transaction.user_id.clone(),
                    transaction.total_amount,
                    encode_json(&transaction.items)?,
                    format_timestamp(&transaction.date),
                    transaction.reference.clone(),
                    transaction.status.as_str(),
                    transaction.payment_method.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_transaction(&self, id: &str) -> AppResult<Option<Transaction>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::transaction_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(
        &self,
        status: Option<TransactionStatus>,
        user_id: Option<&str>,
        page: Page,
    ) -> AppResult<(Vec<Transaction>, u64)> {
        let filter = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR user_id = ?2)";
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE {filter} \
             ORDER BY date DESC LIMIT ?3 OFFSET ?4"
        );
        let count_query = format!("SELECT COUNT(*) FROM transactions WHERE {filter}");

        let status = status.map(|s| s.as_str().to_string());
        let user_id = user_id.map(|u| u.to_string());

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    status.clone(),
                    user_id.clone(),
                    page.limit as i64,
                    page.offset as i64
                ],
            )
            .await?;
        let mut transactions = Vec::new();
        while let Some(row) = rows.next().await? {
            transactions.push(Self::transaction_from_row(&row)?);
        }

        let mut rows = self
            .db
            .connection()
            .query(&count_query, libsql::params![status, user_id])
            .await?;
        let total = match rows.next().await? {
            Some(row) => row.get::<i64>(0)? as u64,
            None => 0,
        };

        Ok((transactions, total))
    }

    /// Updates a transaction's status and mirrors the change into the
    /// owner's embedded history.
    pub async fn update_status(
        &self,
        id: &str,
        status: TransactionStatus,
    ) -> AppResult<Transaction> {
        let _guard = self.db.begin_write().await?;
        let result = self.update_status_inner(id, status).await;
        self.db.finish_write(result).await
    }

    async fn update_status_inner(
        &self,
        id: &str,
        status: TransactionStatus,
    ) -> AppResult<Transaction> {
        let mut transaction = self
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

        self.db
            .connection()
            .execute(
                "UPDATE transactions SET status = ? WHERE id = ?",
                libsql::params![status.as_str(), id],
            )
            .await?;
        transaction.status = status;

        let accounts = Accounts::new(self.db);
        if let Some(mut user) = accounts.get_user(&transaction.user_id).await? {
            if let Some(entry) = user.transaction_history.iter_mut().find(|t| t.id == id) {
                entry.status = status;
                user.updated_at = Utc::now();
                accounts.replace_user(&user).await?;
            }
        }

        Ok(transaction)
    }

    pub async fn stats(&self) -> AppResult<LedgerStats> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT status, COUNT(*) FROM transactions GROUP BY status",
                (),
            )
            .await?;
        let (mut completed, mut pending, mut failed) = (0u64, 0u64, 0u64);
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count = row.get::<i64>(1)? as u64;
            match TransactionStatus::from_str(&status) {
                Some(TransactionStatus::Completed) => completed = count,
                Some(TransactionStatus::Pending) => pending = count,
                Some(TransactionStatus::Failed) => failed = count,
                None => tracing::warn!("unknown transaction status in ledger: {}", status),
            }
        }

        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT COALESCE(SUM(total_amount), 0.0) FROM transactions WHERE status = 'completed'",
                (),
            )
            .await?;
        let total_revenue = match rows.next().await? {
            Some(row) => row.get::<f64>(0)?,
            None => 0.0,
        };

        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY date DESC LIMIT 5"
        );
        let mut rows = self.db.connection().query(&query, ()).await?;
        let mut recent_transactions = Vec::new();
        while let Some(row) = rows.next().await? {
            recent_transactions.push(Self::transaction_from_row(&row)?);
        }

        Ok(LedgerStats {
            total_transactions: completed + pending + failed,
            completed_transactions: completed,
            pending_transactions: pending,
            failed_transactions: failed,
            total_revenue,
            recent_transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PageParams;
    use crate::catalog::CreateBook;
    use crate::model::{CartItem, Role, User};

    async fn seed_book(db: &Database, title: &str, copies: i64) -> Book {
        Catalog::new(db)
            .create_book(CreateBook {
                title: title.to_string(),
                author: "Author".to_string(),
                description: "A description long enough".to_string(),
                price: 10.0,
                rent: 2.0,
                image: "https://example.com/cover.png".to_string(),
                pdf_url: "https://example.com/book.pdf".to_string(),
                category: None,
                total_copies: Some(copies),
            })
            .await
            .unwrap()
    }

    async fn seed_user(db: &Database, id: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: id.to_string(),
            first_name: "Test".to_string(),
            last_name: "Reader".to_string(),
            email: format!("{id}@example.com"),
            phone_number: "5551234".to_string(),
            password_hash: "digest".to_string(),
            role: Role::User,
            brought_books: vec![],
            borrowed_books: vec![],
            transaction_history: vec![],
            comments: vec![],
            appointments: vec![],
            cart: vec![CartItem {
                book_id: "stale".to_string(),
                title: "Stale".to_string(),
                author: "A".to_string(),
                price: 1.0,
                image: "i".to_string(),
                kind: ItemKind::Buy,
                added_at: now,
            }],
            created_at: now,
            updated_at: now,
        };
        Accounts::new(db).insert_user(&user).await.unwrap();
        user
    }

    fn item(book_id: &str, kind: ItemKind) -> CheckoutItem {
        CheckoutItem {
            book_id: book_id.to_string(),
            kind,
        }
    }

    fn all_pages() -> Page {
        PageParams {
            page: None,
            limit: Some(50),
        }
        .resolve()
    }

    #[tokio::test]
    async fn buy_checkout_commits_without_consuming_stock() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Bought", 1).await;
        let user = seed_user(&db, "user_buy").await;

        let ledger = Ledger::new(&db);
        let outcome = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Buy)], None)
            .await
            .unwrap();

        assert_eq!(outcome.total_amount, 10.0);
        assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
        assert_eq!(outcome.transaction.items.len(), 1);
        assert_eq!(outcome.transaction.items[0].price, 10.0);

        // Buying does not consume stock.
        let book = Catalog::new(&db).get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(book.available_copies, 1);

        let user = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(user.brought_books.len(), 1);
        assert_eq!(user.brought_books[0].transaction_ref, outcome.reference);
        assert_eq!(user.transaction_history.len(), 1);
        assert!(user.cart.is_empty());
    }

    #[tokio::test]
    async fn borrow_then_return_round_trips_stock() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Borrowed", 1).await;
        let user = seed_user(&db, "user_borrow").await;

        let ledger = Ledger::new(&db);
        let catalog = Catalog::new(&db);
        let accounts = Accounts::new(&db);

        let outcome = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Borrow)], None)
            .await
            .unwrap();
        assert_eq!(outcome.total_amount, 2.0);

        let stocked = catalog.get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(stocked.available_copies, 0);

        let borrower = accounts.get_user(&user.id).await.unwrap().unwrap();
        let entry = &borrower.borrowed_books[0];
        assert_eq!(entry.status, BorrowStatus::Active);
        assert_eq!(entry.transaction_ref, outcome.reference);
        assert_eq!(entry.return_date, entry.borrow_date + Duration::days(14));

        let returned = ledger.return_book(&user.id, &book.id).await.unwrap();
        assert_eq!(returned.book_id, book.id);

        let stocked = catalog.get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(stocked.available_copies, 1);

        let borrower = accounts.get_user(&user.id).await.unwrap().unwrap();
        let entry = &borrower.borrowed_books[0];
        assert_eq!(entry.status, BorrowStatus::Returned);
        assert!(entry.actual_return_date.is_some());

        // Already returned and never borrowed look the same.
        assert!(matches!(
            ledger.return_book(&user.id, &book.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn empty_checkout_request_fails_validation() {
        let request = CheckoutRequest {
            items: vec![],
            payment_method: None,
        };
        assert!(request.validate().is_err());
    }

    #[tokio::test]
    async fn back_to_back_checkouts_by_one_user_both_commit() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Restocked", 5).await;
        let user = seed_user(&db, "user_rapid").await;

        let ledger = Ledger::new(&db);
        let first = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Buy)], None)
            .await
            .unwrap();
        let second = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Buy)], None)
            .await
            .unwrap();

        assert_ne!(first.reference, second.reference);
        let (_, total) = ledger.list(None, None, all_pages()).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn losing_the_stock_race_mid_checkout_rolls_everything_back() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Contested", 1).await;
        let user = seed_user(&db, "user_race").await;

        // Both items pass the up-front availability check against the same
        // last copy; the second conditional decrement must lose and unwind
        // the whole checkout.
        let ledger = Ledger::new(&db);
        let err = ledger
            .checkout(
                &user.id,
                &[
                    item(&book.id, ItemKind::Borrow),
                    item(&book.id, ItemKind::Borrow),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stocked = Catalog::new(&db).get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(stocked.available_copies, 1);

        let (transactions, total) = ledger.list(None, None, all_pages()).await.unwrap();
        assert!(transactions.is_empty());
        assert_eq!(total, 0);

        let untouched = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert!(untouched.borrowed_books.is_empty());
        assert!(untouched.transaction_history.is_empty());
        assert_eq!(untouched.cart.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_stock_aborts_before_any_write() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Gone", 1).await;
        let user = seed_user(&db, "user_late").await;

        let catalog = Catalog::new(&db);
        assert!(catalog.reserve_copy(&book.id).await.unwrap());

        let ledger = Ledger::new(&db);
        let err = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Borrow)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));

        let (transactions, total) = ledger.list(None, None, all_pages()).await.unwrap();
        assert!(transactions.is_empty());
        assert_eq!(total, 0);

        let untouched = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert!(untouched.borrowed_books.is_empty());
        assert_eq!(untouched.cart.len(), 1);
    }

    #[tokio::test]
    async fn unknown_book_aborts_the_whole_cart() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Known", 1).await;
        let user = seed_user(&db, "user_mixed").await;

        let ledger = Ledger::new(&db);
        let err = ledger
            .checkout(
                &user.id,
                &[
                    item(&book.id, ItemKind::Buy),
                    item("does-not-exist", ItemKind::Buy),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // Nothing committed for the valid item either.
        let (transactions, _) = ledger.list(None, None, all_pages()).await.unwrap();
        assert!(transactions.is_empty());
        let untouched = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert!(untouched.brought_books.is_empty());
        assert!(untouched.transaction_history.is_empty());
    }

    #[tokio::test]
    async fn mixed_checkout_prices_each_item_by_kind() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Both", 2).await;
        let user = seed_user(&db, "user_both").await;

        let ledger = Ledger::new(&db);
        let outcome = ledger
            .checkout(
                &user.id,
                &[
                    item(&book.id, ItemKind::Buy),
                    item(&book.id, ItemKind::Borrow),
                ],
                Some("wallet".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(outcome.total_amount, 12.0);
        assert_eq!(outcome.transaction.payment_method, "wallet");

        let stocked = Catalog::new(&db).get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(stocked.available_copies, 1);
        assert!(stocked.available_copies <= stocked.total_copies);
        assert!(stocked.available_copies >= 0);
    }

    #[tokio::test]
    async fn status_update_mirrors_into_the_account_history() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Mirrored", 1).await;
        let user = seed_user(&db, "user_status").await;

        let ledger = Ledger::new(&db);
        let outcome = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Buy)], None)
            .await
            .unwrap();

        let updated = ledger
            .update_status(&outcome.transaction.id, TransactionStatus::Failed)
            .await
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::Failed);

        let account = Accounts::new(&db).get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(
            account.transaction_history[0].status,
            TransactionStatus::Failed
        );
    }

    #[tokio::test]
    async fn stats_aggregate_the_ledger() {
        let db = Database::open_in_memory().await.unwrap();
        let book = seed_book(&db, "Counted", 5).await;
        let user = seed_user(&db, "user_stats").await;

        let ledger = Ledger::new(&db);
        let first = ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Buy)], None)
            .await
            .unwrap();
        ledger
            .checkout(&user.id, &[item(&book.id, ItemKind::Borrow)], None)
            .await
            .unwrap();
        ledger
            .update_status(&first.transaction.id, TransactionStatus::Failed)
            .await
            .unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.completed_transactions, 1);
        assert_eq!(stats.failed_transactions, 1);
        assert_eq!(stats.total_revenue, 2.0);
        assert_eq!(stats.recent_transactions.len(), 2);
    }
}
