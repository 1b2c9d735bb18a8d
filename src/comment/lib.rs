use chrono::Utc;
use libsql::Row;
use serde::Deserialize;

use crate::account::Accounts;
use crate::api::Page;
use crate::catalog::Catalog;
use crate::db::{Database, format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::helpers;
use crate::model::{BookComment, Comment, User};

const COMMENT_COLUMNS: &str =
    "id, user_id, book_id, user_name, content, rating, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub content: String,
    pub rating: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComment {
    pub content: Option<String>,
    pub rating: Option<i64>,
}

fn check_content(content: &str) -> AppResult<()> {
    if content.trim().len() < 5 {
        return Err(AppError::Validation(
            "Comment must be at least 5 characters long".to_string(),
        ));
    }
    Ok(())
}

fn check_rating(rating: Option<i64>) -> AppResult<()> {
    if let Some(rating) = rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
    }
    Ok(())
}

fn book_copy(comment: &Comment) -> BookComment {
    BookComment {
        id: comment.id.clone(),
        user_id: comment.user_id.clone(),
        user_name: comment.user_name.clone(),
        content: comment.content.clone(),
        rating: comment.rating,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    }
}

pub struct Comments<'a> {
    db: &'a Database,
}

impl<'a> Comments<'a> {
    pub fn new(db: &'a Database) -> Self {
        Comments { db }
    }

    fn comment_from_row(row: &Row) -> AppResult<Comment> {
        Ok(Comment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            user_name: row.get(3)?,
            content: row.get(4)?,
            rating: row.get(5)?,
            created_at: parse_timestamp(&row.get::<String>(6)?)?,
            updated_at: parse_timestamp(&row.get::<String>(7)?)?,
        })
    }

    /// Records a comment and mirrors it onto the author and, when it reviews
    /// a book, onto that book.
    pub async fn create(
        &self,
        author: &User,
        book_id: Option<String>,
        payload: CommentPayload,
    ) -> AppResult<Comment> {
        check_content(&payload.content)?;
        check_rating(payload.rating)?;

        let _guard = self.db.begin_write().await?;
        let result = self.create_inner(author, book_id, payload).await;
        self.db.finish_write(result).await
    }

    async fn create_inner(
        &self,
        author: &User,
        book_id: Option<String>,
        payload: CommentPayload,
    ) -> AppResult<Comment> {
        let now = Utc::now();
        let comment = Comment {
            id: helpers::generate_comment_id(),
            user_id: author.id.clone(),
            user_name: author.full_name(),
            book_id: book_id.clone(),
            content: payload.content,
            rating: payload.rating,
            created_at: now,
            updated_at: now,
        };

        let query = format!(
            "INSERT INTO comments ({COMMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.db
            .connection()
            .execute(
                &query,
                libsql::params![
                    comment.id.clone(),
                    comment.user_id.clone(),
                    comment.book_id.clone(),
                    comment.user_name.clone(),
                    comment.content.clone(),
                    comment.rating,
                    format_timestamp(&comment.created_at),
                    format_timestamp(&comment.updated_at),
                ],
            )
            .await?;

        let accounts = Accounts::new(self.db);
        let mut user = accounts
            .get_user(&author.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        user.comments.push(comment.clone());
        user.updated_at = now;
        accounts.replace_user(&user).await?;

        if let Some(book_id) = &book_id {
            let catalog = Catalog::new(self.db);
            let book = catalog
                .get_book(book_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
            let mut copies = book.comments;
            copies.push(book_copy(&comment));
            catalog.set_book_comments(book_id, &copies).await?;
        }

        Ok(comment)
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<Comment>> {
        let query = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::comment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(
        &self,
        book_id: Option<&str>,
        user_id: Option<&str>,
        page: Page,
    ) -> AppResult<(Vec<Comment>, u64)> {
        let filter = "(?1 IS NULL OR book_id = ?1) AND (?2 IS NULL OR user_id = ?2)";
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE {filter} \
             ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
        );
        let count_query = format!("SELECT COUNT(*) FROM comments WHERE {filter}");

        let book_id = book_id.map(|b| b.to_string());
        let user_id = user_id.map(|u| u.to_string());

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    book_id.clone(),
                    user_id.clone(),
                    page.limit as i64,
                    page.offset as i64
                ],
            )
            .await?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next().await? {
            comments.push(Self::comment_from_row(&row)?);
        }

        let mut rows = self
            .db
            .connection()
            .query(&count_query, libsql::params![book_id, user_id])
            .await?;
        let total = match rows.next().await? {
            Some(row) => row.get::<i64>(0)? as u64,
            None => 0,
        };

        Ok((comments, total))
    }

    /// Rewrites a comment's content or rating and refreshes every embedded
    /// copy of it.
    pub async fn update(&self, id: &str, payload: UpdateComment) -> AppResult<Comment> {
        if let Some(content) = &payload.content {
            check_content(content)?;
        }
        check_rating(payload.rating)?;

        let _guard = self.db.begin_write().await?;
        let result = self.update_inner(id, payload).await;
        self.db.finish_write(result).await
    }

    async fn update_inner(&self, id: &str, payload: UpdateComment) -> AppResult<Comment> {
        let mut comment = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

        if let Some(content) = payload.content {
            comment.content = content;
        }
        if payload.rating.is_some() {
            comment.rating = payload.rating;
        }
        comment.updated_at = Utc::now();

        self.db
            .connection()
            .execute(
                "UPDATE comments SET content = ?, rating = ?, updated_at = ? WHERE id = ?",
                libsql::params![
                    comment.content.clone(),
                    comment.rating,
                    format_timestamp(&comment.updated_at),
                    id
                ],
            )
            .await?;

        self.mirror(&comment, Some(&comment)).await?;
        Ok(comment)
    }

    /// Removes a comment and its embedded copies.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let _guard = self.db.begin_write().await?;
        let result = self.delete_inner(id).await;
        self.db.finish_write(result).await
    }

    async fn delete_inner(&self, id: &str) -> AppResult<()> {
        let comment = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

        self.db
            .connection()
            .execute("DELETE FROM comments WHERE id = ?", libsql::params![id])
            .await?;

        self.mirror(&comment, None).await?;
        Ok(())
    }

    /// Applies `replacement` (or removal, when `None`) to the author's and
    /// the book's embedded copies of `comment`.
    async fn mirror(&self, comment: &Comment, replacement: Option<&Comment>) -> AppResult<()> {
        let accounts = Accounts::new(self.db);
        if let Some(mut user) = accounts.get_user(&comment.user_id).await? {
            match replacement {
                Some(updated) => {
                    if let Some(entry) = user.comments.iter_mut().find(|c| c.id == comment.id) {
                        *entry = updated.clone();
                    }
                }
                None => user.comments.retain(|c| c.id != comment.id),
            }
            user.updated_at = Utc::now();
            accounts.replace_user(&user).await?;
        }

        if let Some(book_id) = &comment.book_id {
            let catalog = Catalog::new(self.db);
            if let Some(book) = catalog.get_book(book_id).await? {
                let mut copies = book.comments;
                match replacement {
                    Some(updated) => {
                        if let Some(entry) = copies.iter_mut().find(|c| c.id == comment.id) {
                            *entry = book_copy(updated);
                        }
                    }
                    None => copies.retain(|c| c.id != comment.id),
                }
                catalog.set_book_comments(book_id, &copies).await?;
            }
        }

        Ok(())
    }
}
