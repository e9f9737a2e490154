//! Store key schema.
//!
//! Every record the engine reads or writes lives under one of these keys.
//! Identifiers are validated on parse so they can never contain the `:`
//! separator.

use common::{ItemId, OrderId, SaleEventId, UserId};

/// FIFO list of checkout order ids awaiting fulfilment.
pub const ORDER_QUEUE: &str = "queue:orders";

/// Event log of created checkout orders.
pub const ORDER_STREAM: &str = "stream:orders";

/// Event log of successful flash-sale admissions.
pub const SECKILL_STREAM: &str = "stream:seckill";

/// Set of every configured flash-sale event id.
pub const SALE_EVENTS: &str = "seckill:events";

/// Regular stock counter of an item.
pub fn stock(item: &ItemId) -> String {
    format!("stock:{item}")
}

/// Catalog record of an item.
pub fn product(item: &ItemId) -> String {
    format!("product:{item}")
}

/// Cart hash of a buyer.
pub fn cart(buyer: &UserId) -> String {
    format!("cart:{buyer}")
}

/// Checkout order record.
pub fn order(id: &OrderId) -> String {
    format!("order:{id}")
}

/// Checkout order history of a buyer.
pub fn user_orders(buyer: &UserId) -> String {
    format!("user:{buyer}:orders")
}

/// Configuration record of a flash-sale event.
pub fn sale_config(event: &SaleEventId) -> String {
    format!("seckill:event:{event}")
}

/// Remaining quota counter of a flash-sale event.
pub fn sale_remaining(event: &SaleEventId) -> String {
    format!("seckill:stock:{event}")
}

/// Admitted participants of a flash-sale event.
pub fn sale_participants(event: &SaleEventId) -> String {
    format!("seckill:users:{event}")
}

/// Admission order record.
pub fn sale_order(id: &OrderId) -> String {
    format!("seckill:order:{id}")
}

/// Admission orders of a flash-sale event, in admission order.
pub fn sale_orders(event: &SaleEventId) -> String {
    format!("seckill:orders:{event}")
}

/// Admission history of a participant.
pub fn user_sale_orders(participant: &UserId) -> String {
    format!("user:{participant}:seckill_orders")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_keys() {
        let event = SaleEventId::parse("2991").unwrap();
        assert_eq!(sale_remaining(&event), "seckill:stock:2991");
        assert_eq!(sale_participants(&event), "seckill:users:2991");
        assert_eq!(stock(&ItemId::parse("7").unwrap()), "stock:7");
    }

    #[test]
    fn history_keys() {
        let user = UserId::parse("alice").unwrap();
        assert_eq!(user_orders(&user), "user:alice:orders");
        assert_eq!(user_sale_orders(&user), "user:alice:seckill_orders");
    }
}
