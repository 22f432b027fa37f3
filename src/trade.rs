use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trade represents a matched transaction between two orders.
///
/// - `price` comes from the maker's resting order.
/// - `quantity` is the amount filled in this single match.
/// - `aggressor_side` is the taker's side.
/// - Once emitted a trade is immutable and owned by whoever received it
///   from the publication bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    pub aggressor_side: crate::orders::Side,
    pub maker_order_id: Uuid,
    pub taker_order_id: Uuid,
    pub timestamp: DateTime<Utc>,
}
