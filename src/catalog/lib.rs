use chrono::Utc;
use libsql::Row;
use serde::Deserialize;
use validator::Validate;

use crate::api::Page;
use crate::db::{Database, decode_json, encode_json, format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::helpers;
use crate::model::{Book, BookComment};

const BOOK_COLUMNS: &str = "id, title, author, description, price, rent, image, pdf_url, \
     category, total_copies, available_copies, comments, date_added, updated_at";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub author: String,
    #[validate(length(min = 10))]
    pub description: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(range(min = 0.0))]
    pub rent: f64,
    #[validate(url)]
    pub image: String,
    #[validate(url)]
    pub pdf_url: String,
    pub category: Option<String>,
    #[validate(range(min = 1))]
    pub total_copies: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub author: Option<String>,
    #[validate(length(min = 10))]
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[validate(range(min = 0.0))]
    pub rent: Option<f64>,
    #[validate(url)]
    pub image: Option<String>,
    #[validate(url)]
    pub pdf_url: Option<String>,
    pub category: Option<String>,
}

pub struct Catalog<'a> {
    db: &'a Database,
}

impl<'a> Catalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Catalog { db }
    }

    fn book_from_row(row: &Row) -> AppResult<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
            price: row.get(4)?,
            rent: row.get(5)?,
            image: row.get(6)?,
            pdf_url: row.get(7)?,
            category: row.get(8)?,
            total_copies: row.get(9)?,
            available_copies: row.get(10)?,
            comments: decode_json(&row.get::<String>(11)?)?,
            date_added: parse_timestamp(&row.get::<String>(12)?)?,
            updated_at: parse_timestamp(&row.get::<String>(13)?)?,
        })
    }

    pub async fn create_book(&self, payload: CreateBook) -> AppResult<Book> {
        let now = Utc::now();
        let total_copies = payload.total_copies.unwrap_or(1);
        let book = Book {
            id: helpers::generate_book_id(),
            title: payload.title,
            author: payload.author,
            description: payload.description,
            price: payload.price,
            rent: payload.rent,
            image: payload.image,
            pdf_url: payload.pdf_url,
            category: payload.category.unwrap_or_else(|| "General".to_string()),
            total_copies,
            available_copies: total_copies,
            comments: vec![],
            date_added: now,
            updated_at: now,
        };

        let query = format!(
            "INSERT INTO books ({BOOK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.db
            .connection()
            .execute(
                &query,
                libsql::params![
                    book.id.clone(),
                    book.title.clone(),
                    book.author.clone(),
                    book.description.clone(),
                    book.price,
                    book.rent,
                    book.image.clone(),
                    book.pdf_url.clone(),
                    book.category.clone(),
                    book.total_copies,
                    book.available_copies,
                    encode_json(&book.comments)?,
                    format_timestamp(&book.date_added),
                    format_timestamp(&book.updated_at),
                ],
            )
            .await?;

        Ok(book)
    }

    pub async fn get_book(&self, book_id: &str) -> AppResult<Option<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![book_id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::book_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_books(
        &self,
        category: Option<&str>,
        search: Option<&str>,
        page: Page,
    ) -> AppResult<(Vec<Book>, u64)> {
        let filter = "(?1 IS NULL OR category = ?1) \
             AND (?2 IS NULL OR title LIKE ?2 OR author LIKE ?2 OR description LIKE ?2)";
        let query = format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE {filter} \
             ORDER BY date_added DESC LIMIT ?3 OFFSET ?4"
        );
        let count_query = format!("SELECT COUNT(*) FROM books WHERE {filter}");

        let pattern = search.map(|s| format!("%{s}%"));
        let category = category.map(|c| c.to_string());

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    category.clone(),
                    pattern.clone(),
                    page.limit as i64,
                    page.offset as i64
                ],
            )
            .await?;

        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(Self::book_from_row(&row)?);
        }

        let mut rows = self
            .db
            .connection()
            .query(&count_query, libsql::params![category, pattern])
            .await?;
        let total = match rows.next().await? {
            Some(row) => row.get::<i64>(0)? as u64,
            None => 0,
        };

        Ok((books, total))
    }

    pub async fn update_book(&self, book_id: &str, payload: UpdateBook) -> AppResult<Book> {
        let mut book = self
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        if let Some(title) = payload.title {
            book.title = title;
        }
        if let Some(author) = payload.author {
            book.author = author;
        }
        if let Some(description) = payload.description {
            book.description = description;
        }
        if let Some(price) = payload.price {
            book.price = price;
        }
        if let Some(rent) = payload.rent {
            book.rent = rent;
        }
        if let Some(image) = payload.image {
            book.image = image;
        }
        if let Some(pdf_url) = payload.pdf_url {
            book.pdf_url = pdf_url;
        }
        if let Some(category) = payload.category {
            book.category = category;
        }
        book.updated_at = Utc::now();

        self.db
            .connection()
            .execute(
                "UPDATE books SET title = ?, author = ?, description = ?, price = ?, rent = ?, \
                 image = ?, pdf_url = ?, category = ?, updated_at = ? WHERE id = ?",
                libsql::params![
                    book.title.clone(),
                    book.author.clone(),
                    book.description.clone(),
                    book.price,
                    book.rent,
                    book.image.clone(),
                    book.pdf_url.clone(),
                    book.category.clone(),
                    format_timestamp(&book.updated_at),
                    book_id
                ],
            )
            .await?;

        Ok(book)
    }

    /// Deletion is refused while any account still holds an active borrow of
    /// the book.
    pub async fn delete_book(&self, book_id: &str) -> AppResult<()> {
        let _guard = self.db.begin_write().await?;
        let result = self.delete_book_inner(book_id).await;
        self.db.finish_write(result).await
    }

    async fn delete_book_inner(&self, book_id: &str) -> AppResult<()> {
        if self.has_active_borrow(book_id).await? {
            return Err(AppError::Conflict(
                "Book has active borrows and cannot be deleted".to_string(),
            ));
        }

        let affected = self
            .db
            .connection()
            .execute("DELETE FROM books WHERE id = ?", libsql::params![book_id])
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        Ok(())
    }

    pub async fn has_active_borrow(&self, book_id: &str) -> AppResult<bool> {
        let query = r#"
SELECT 1
FROM users, json_each(users.borrowed_books)
WHERE json_extract(json_each.value, '$.id') = ?1
  AND json_extract(json_each.value, '$.status') = 'active'
LIMIT 1
"#;
        let mut rows = self
            .db
            .connection()
            .query(query, libsql::params![book_id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Atomic conditional decrement: takes one copy if and only if stock is
    /// still positive. Returns false when another checkout won the race.
    pub async fn reserve_copy(&self, book_id: &str) -> AppResult<bool> {
        let affected = self
            .db
            .connection()
            .execute(
                "UPDATE books SET available_copies = available_copies - 1, updated_at = ? \
                 WHERE id = ? AND available_copies > 0",
                libsql::params![format_timestamp(&Utc::now()), book_id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Gives one copy back, clamped so the counter never exceeds
    /// `total_copies` even after a prior inconsistency.
    pub async fn release_copy(&self, book_id: &str) -> AppResult<()> {
        self.db
            .connection()
            .execute(
                "UPDATE books SET available_copies = MIN(available_copies + 1, total_copies), \
                 updated_at = ? WHERE id = ?",
                libsql::params![format_timestamp(&Utc::now()), book_id],
            )
            .await?;
        Ok(())
    }

    /// Rewrites the embedded comment copies on a book record.
    pub async fn set_book_comments(
        &self,
        book_id: &str,
        comments: &[BookComment],
    ) -> AppResult<()> {
        self.db
            .connection()
            .execute(
                "UPDATE books SET comments = ?, updated_at = ? WHERE id = ?",
                libsql::params![
                    encode_json(&comments)?,
                    format_timestamp(&Utc::now()),
                    book_id
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        let mut rows = self
            .db
            .connection()
            .query("SELECT DISTINCT category FROM books ORDER BY category", ())
            .await?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(row.get(0)?);
        }
        Ok(categories)
    }

    /// Most-commented books first.
    pub async fn popular(&self, limit: i64) -> AppResult<Vec<Book>> {
        let query = format!(
            "SELECT {BOOK_COLUMNS} FROM books \
             ORDER BY json_array_length(comments) DESC LIMIT ?"
        );
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![limit])
            .await?;
        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(Self::book_from_row(&row)?);
        }
        Ok(books)
    }
}

/// Average of the ratings carried by a book's comments, one decimal place.
/// Unrated comments count as zero, matching the historical behavior.
pub fn average_rating(comments: &[BookComment]) -> f64 {
    if comments.is_empty() {
        return 0.0;
    }
    let total: i64 = comments.iter().map(|c| c.rating.unwrap_or(0)).sum();
    let avg = total as f64 / comments.len() as f64;
    (avg * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Accounts;
    use crate::model::{BorrowStatus, BorrowedBookEntry, Role, User};
    use chrono::Utc;

    fn create_payload(title: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: "Author".to_string(),
            description: "A description long enough".to_string(),
            price: 10.0,
            rent: 2.0,
            image: "https://example.com/cover.png".to_string(),
            pdf_url: "https://example.com/book.pdf".to_string(),
            category: None,
            total_copies: Some(1),
        }
    }

    fn borrower(book_id: &str) -> User {
        let now = Utc::now();
        User {
            id: "user_b".to_string(),
            first_name: "B".to_string(),
            last_name: "Orrower".to_string(),
            email: "b@example.com".to_string(),
            phone_number: "5550000".to_string(),
            password_hash: "digest".to_string(),
            role: Role::User,
            brought_books: vec![],
            borrowed_books: vec![BorrowedBookEntry {
                id: book_id.to_string(),
                title: "t".to_string(),
                author: "a".to_string(),
                image: "i".to_string(),
                price: 2.0,
                pdf_url: "p".to_string(),
                borrow_date: now,
                return_date: now,
                actual_return_date: None,
                transaction_ref: "ORDER_1_user_b".to_string(),
                status: BorrowStatus::Active,
            }],
            transaction_history: vec![],
            comments: vec![],
            appointments: vec![],
            cart: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn reserve_copy_refuses_the_last_copy_race() {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = Catalog::new(&db);
        let book = catalog.create_book(create_payload("Single Copy")).await.unwrap();

        assert!(catalog.reserve_copy(&book.id).await.unwrap());
        assert!(!catalog.reserve_copy(&book.id).await.unwrap());

        let book = catalog.get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(book.available_copies, 0);
    }

    #[tokio::test]
    async fn release_copy_clamps_at_total_copies() {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = Catalog::new(&db);
        let book = catalog.create_book(create_payload("Clamped")).await.unwrap();

        catalog.release_copy(&book.id).await.unwrap();
        catalog.release_copy(&book.id).await.unwrap();

        let book = catalog.get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(book.available_copies, book.total_copies);
    }

    #[tokio::test]
    async fn delete_is_refused_while_a_borrow_is_active() {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = Catalog::new(&db);
        let accounts = Accounts::new(&db);
        let book = catalog.create_book(create_payload("Borrowed")).await.unwrap();
        accounts.insert_user(&borrower(&book.id)).await.unwrap();

        let err = catalog.delete_book(&book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(catalog.get_book(&book.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_books_filters_by_category_and_search() {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = Catalog::new(&db);
        let mut fiction = create_payload("The Long Voyage");
        fiction.category = Some("Fiction".to_string());
        catalog.create_book(fiction).await.unwrap();
        catalog.create_book(create_payload("Cookbook")).await.unwrap();

        let page = crate::api::PageParams {
            page: None,
            limit: None,
        }
        .resolve();
        let (books, total) = catalog
            .list_books(Some("Fiction"), None, page)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "The Long Voyage");

        let (books, total) = catalog.list_books(None, Some("voyage"), page).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "The Long Voyage");
    }

    #[test]
    fn average_rating_rounds_to_one_decimal() {
        assert_eq!(average_rating(&[]), 0.0);
        let now = Utc::now();
        let comment = |rating| BookComment {
            id: "c".to_string(),
            user_id: "u".to_string(),
            user_name: "n".to_string(),
            content: "great read".to_string(),
            rating,
            created_at: now,
            updated_at: now,
        };
        let comments = vec![comment(Some(5)), comment(Some(4)), comment(None)];
        assert_eq!(average_rating(&comments), 3.0);
    }
}
