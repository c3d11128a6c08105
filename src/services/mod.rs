//! Database operations shared by several route groups. Every function here
//! expects to run inside the caller's transaction.

use uuid::Uuid;

pub mod bulk_orders;
pub mod ledger;
pub mod orders;
pub mod returns;
pub mod rewards;

pub const ORDER_PREFIX: &str = "ORD";
pub const BULK_ORDER_PREFIX: &str = "BLK";

/// Human-facing order number such as `ORD3F9A1C07B2`.
pub fn order_number(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}{}", prefix, &id[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_are_prefixed_and_distinct() {
        let a = order_number(ORDER_PREFIX);
        let b = order_number(ORDER_PREFIX);
        assert!(a.starts_with("ORD"));
        assert_eq!(a.len(), 13);
        assert_ne!(a, b);
        assert!(order_number(BULK_ORDER_PREFIX).starts_with("BLK"));
    }
}
