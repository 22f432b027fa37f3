use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the book an order sits on or aggresses against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side, used to pick which book side an aggressor matches against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// The four order types the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Ioc,
    Fok,
}

/// Disposition of a submitted order once matching has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Accepted,
    Canceled,
    Rejected,
}

/// An immutable order record as accepted by the engine.
///
/// `quantity` is the submitted quantity at construction time; while an
/// order rests on the book its residual is tracked by [`RestingOrder`]
/// instead, so this type never needs interior mutability.
#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: Uuid,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// An order resting in a [`crate::price_level::PriceLevel`].
///
/// Carries the same identity as the originating [`Order`] but tracks the
/// current unfilled residual quantity, which is decremented in place as
/// the order is matched against by later aggressors.
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub order_id: Uuid,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl RestingOrder {
    pub fn from_order(order: &Order, residual: Decimal) -> Self {
        Self {
            order_id: order.order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price.expect("resting order must carry a price"),
            quantity: residual,
            timestamp: order.timestamp,
        }
    }
}
