use chrono::Utc;
use uuid::Uuid;

use crate::model::{Book, CartItem, ItemKind};

fn suffix() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn generate_transaction_id() -> String {
    format!("tx_{}", suffix())
}

/// Human-readable order reference. The millisecond timestamp keeps references
/// roughly chronological; the random fragment keeps back-to-back checkouts by
/// the same user inside one millisecond from colliding. The ledger additionally
/// enforces uniqueness with a constraint.
pub fn generate_transaction_reference(user_id: &str) -> String {
    format!(
        "ORDER_{}_{}_{}",
        Utc::now().timestamp_millis(),
        &suffix()[..6],
        user_id
    )
}

pub fn generate_user_id() -> String {
    format!("user_{}", suffix())
}

pub fn generate_book_id() -> String {
    format!("book_{}", suffix())
}

pub fn generate_comment_id() -> String {
    format!("comment_{}", suffix())
}

pub fn generate_appointment_id(user_id: &str) -> String {
    format!("apt_{}_{}", user_id, suffix())
}

/// Prices a cart against the live catalog: buy at the sale price, borrow at
/// the rental price. Items whose book has disappeared contribute nothing.
pub fn cart_total(cart: &[CartItem], books: &[Book]) -> f64 {
    cart.iter()
        .map(|item| {
            books
                .iter()
                .find(|b| b.id == item.book_id)
                .map(|book| match item.kind {
                    ItemKind::Buy => book.price,
                    ItemKind::Borrow => book.rent,
                })
                .unwrap_or(0.0)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn book(id: &str, price: f64, rent: f64) -> Book {
        Book {
            id: id.to_string(),
            title: format!("{id} title"),
            author: "author".to_string(),
            description: "a test book".to_string(),
            price,
            rent,
            image: "https://example.com/cover.png".to_string(),
            pdf_url: "https://example.com/book.pdf".to_string(),
            category: "General".to_string(),
            total_copies: 1,
            available_copies: 1,
            comments: vec![],
            date_added: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn cart_item(book_id: &str, kind: ItemKind) -> CartItem {
        CartItem {
            book_id: book_id.to_string(),
            title: "t".to_string(),
            author: "a".to_string(),
            price: 0.0,
            image: "i".to_string(),
            kind,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn ids_carry_their_prefix_and_never_collide() {
        let a = generate_transaction_id();
        let b = generate_transaction_id();
        assert!(a.starts_with("tx_"));
        assert_ne!(a, b);
        assert!(generate_user_id().starts_with("user_"));
        assert!(generate_book_id().starts_with("book_"));
        assert!(generate_comment_id().starts_with("comment_"));
        assert!(generate_appointment_id("user_1").starts_with("apt_user_1_"));
    }

    #[test]
    fn reference_embeds_the_user_id() {
        let reference = generate_transaction_reference("user_42");
        assert!(reference.starts_with("ORDER_"));
        assert!(reference.ends_with("_user_42"));
    }

    #[test]
    fn references_for_one_user_never_collide() {
        let a = generate_transaction_reference("user_42");
        let b = generate_transaction_reference("user_42");
        assert_ne!(a, b);
    }

    #[test]
    fn cart_total_prices_by_kind() {
        let books = vec![book("b1", 10.0, 2.0), book("b2", 20.0, 5.0)];
        let cart = vec![
            cart_item("b1", ItemKind::Buy),
            cart_item("b2", ItemKind::Borrow),
            cart_item("missing", ItemKind::Buy),
        ];
        assert_eq!(cart_total(&cart, &books), 15.0);
    }
}
