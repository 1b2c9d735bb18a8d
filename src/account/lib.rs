use anyhow::anyhow;
use libsql::Row;

use crate::db::{Database, decode_json, encode_json, format_timestamp, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::model::{Role, User};

const USER_COLUMNS: &str = "id, first_name, last_name, email, phone_number, password_hash, role, \
     brought_books, borrowed_books, transaction_history, comments, appointments, cart, \
     created_at, updated_at";

pub struct Accounts<'a> {
    db: &'a Database,
}

impl<'a> Accounts<'a> {
    pub fn new(db: &'a Database) -> Self {
        Accounts { db }
    }

    fn user_from_row(row: &Row) -> AppResult<User> {
        let role_raw: String = row.get(6)?;
        let role = Role::from_str(&role_raw)
            .ok_or_else(|| AppError::Store(anyhow!("invalid role: {role_raw}")))?;
        Ok(User {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            phone_number: row.get(4)?,
            password_hash: row.get(5)?,
            role,
            brought_books: decode_json(&row.get::<String>(7)?)?,
            borrowed_books: decode_json(&row.get::<String>(8)?)?,
            transaction_history: decode_json(&row.get::<String>(9)?)?,
            comments: decode_json(&row.get::<String>(10)?)?,
            appointments: decode_json(&row.get::<String>(11)?)?,
            cart: decode_json(&row.get::<String>(12)?)?,
            created_at: parse_timestamp(&row.get::<String>(13)?)?,
            updated_at: parse_timestamp(&row.get::<String>(14)?)?,
        })
    }

    pub async fn insert_user(&self, user: &User) -> AppResult<()> {
        let query = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.db
            .connection()
            .execute(
                &query,
                libsql::params![
                    user.id.clone(),
                    user.first_name.clone(),
                    user.last_name.clone(),
                    user.email.clone(),
                    user.phone_number.clone(),
                    user.password_hash.clone(),
                    user.role.as_str(),
                    encode_json(&user.brought_books)?,
                    encode_json(&user.borrowed_books)?,
                    encode_json(&user.transaction_history)?,
                    encode_json(&user.comments)?,
                    encode_json(&user.appointments)?,
                    encode_json(&user.cart)?,
                    format_timestamp(&user.created_at),
                    format_timestamp(&user.updated_at),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> AppResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![user_id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![email.to_lowercase()])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Full-document replace of an account row, embedded lists included.
    pub async fn replace_user(&self, user: &User) -> AppResult<()> {
        let affected = self
            .db
            .connection()
            .execute(
                "UPDATE users SET first_name = ?, last_name = ?, email = ?, phone_number = ?, \
                 password_hash = ?, role = ?, brought_books = ?, borrowed_books = ?, \
                 transaction_history = ?, comments = ?, appointments = ?, cart = ?, \
                 updated_at = ? WHERE id = ?",
                libsql::params![
                    user.first_name.clone(),
                    user.last_name.clone(),
                    user.email.clone(),
                    user.phone_number.clone(),
                    user.password_hash.clone(),
                    user.role.as_str(),
                    encode_json(&user.brought_books)?,
                    encode_json(&user.borrowed_books)?,
                    encode_json(&user.transaction_history)?,
                    encode_json(&user.comments)?,
                    encode_json(&user.appointments)?,
                    encode_json(&user.cart)?,
                    format_timestamp(&user.updated_at),
                    user.id.clone(),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
        let mut rows = self.db.connection().query(&query, ()).await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(Self::user_from_row(&row)?);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CartItem, ItemKind};
    use chrono::Utc;

    pub(crate) fn plain_user(id: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            phone_number: "5551234".to_string(),
            password_hash: "digest".to_string(),
            role: Role::User,
            brought_books: vec![],
            borrowed_books: vec![],
            transaction_history: vec![],
            comments: vec![],
            appointments: vec![],
            cart: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trips_embedded_lists() {
        let db = Database::open_in_memory().await.unwrap();
        let accounts = Accounts::new(&db);
        let mut user = plain_user("user_1", "one@example.com");
        user.cart.push(CartItem {
            book_id: "b1".to_string(),
            title: "Title".to_string(),
            author: "Author".to_string(),
            price: 10.0,
            image: "img".to_string(),
            kind: ItemKind::Buy,
            added_at: Utc::now(),
        });
        accounts.insert_user(&user).await.unwrap();

        let fetched = accounts.get_user("user_1").await.unwrap().unwrap();
        assert_eq!(fetched.email, "one@example.com");
        assert_eq!(fetched.cart.len(), 1);
        assert_eq!(fetched.cart[0].book_id, "b1");
        assert_eq!(fetched.cart[0].kind, ItemKind::Buy);
    }

    #[tokio::test]
    async fn replace_user_overwrites_the_whole_document() {
        let db = Database::open_in_memory().await.unwrap();
        let accounts = Accounts::new(&db);
        let mut user = plain_user("user_1", "one@example.com");
        accounts.insert_user(&user).await.unwrap();

        user.first_name = "Renamed".to_string();
        user.cart.push(CartItem {
            book_id: "b2".to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            price: 5.0,
            image: "i".to_string(),
            kind: ItemKind::Borrow,
            added_at: Utc::now(),
        });
        accounts.replace_user(&user).await.unwrap();

        let fetched = accounts.get_user("user_1").await.unwrap().unwrap();
        assert_eq!(fetched.first_name, "Renamed");
        assert_eq!(fetched.cart.len(), 1);
    }

    #[tokio::test]
    async fn replacing_a_missing_user_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let accounts = Accounts::new(&db);
        let user = plain_user("ghost", "ghost@example.com");
        assert!(matches!(
            accounts.replace_user(&user).await,
            Err(AppError::NotFound(_))
        ));
    }
}
