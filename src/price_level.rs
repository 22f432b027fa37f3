use crate::orders::RestingOrder;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// FIFO queue of resting orders at a single price, with a cached aggregate
/// quantity kept in lockstep with the queue.
///
/// Every mutation updates `total_qty` in the same step that mutates
/// `orders`, so the two invariants spec'd for this type — "total_qty is
/// the exact sum of residuals" and "empty iff queue empty or qty <= 0" —
/// can never drift apart.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    orders: VecDeque<RestingOrder>,
    pub total_qty: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_qty: Decimal::ZERO,
        }
    }

    /// Enqueue an order at the tail, preserving FIFO: the first order
    /// enqueued at a price is the first to match.
    pub fn enqueue(&mut self, order: RestingOrder) {
        self.total_qty += order.quantity;
        self.orders.push_back(order);
    }

    pub fn peek(&self) -> Option<&RestingOrder> {
        self.orders.front()
    }

    pub fn peek_mut(&mut self) -> Option<&mut RestingOrder> {
        self.orders.front_mut()
    }

    /// Pop the head of the queue. Callers are responsible for having
    /// already decremented `total_qty` by the popped order's residual.
    pub fn pop_front(&mut self) -> Option<RestingOrder> {
        self.orders.pop_front()
    }

    /// Decrement the head order's residual by `qty`, keeping `total_qty`
    /// synchronized, and pop it off the queue if fully consumed.
    ///
    /// Returns the maker's order id and the quantity actually removed.
    pub fn fill_head(&mut self, qty: Decimal) -> Option<(RestingOrder, Decimal)> {
        let maker = self.orders.front_mut()?;
        let trade_qty = qty.min(maker.quantity);
        maker.quantity -= trade_qty;
        self.total_qty -= trade_qty;
        let exhausted = maker.quantity.is_zero();
        let maker = if exhausted {
            self.orders.pop_front().expect("front just verified present")
        } else {
            self.orders.front().cloned().expect("front just verified present")
        };
        Some((maker, trade_qty))
    }

    /// A level is empty when either its queue is empty or its cached
    /// total is non-positive. The two conditions are kept from drifting
    /// apart by construction; this reads as a belt-and-suspenders check.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() || self.total_qty <= Decimal::ZERO
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order(qty: Decimal) -> RestingOrder {
        RestingOrder {
            order_id: Uuid::new_v4(),
            symbol: Symbol::new("BTC-USDT"),
            side: crate::orders::Side::Buy,
            price: dec!(100),
            quantity: qty,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn enqueue_preserves_fifo_and_total_qty() {
        let mut lvl = PriceLevel::new(dec!(100));
        let a = order(dec!(1));
        let a_id = a.order_id;
        lvl.enqueue(a);
        lvl.enqueue(order(dec!(2)));

        assert_eq!(lvl.total_qty, dec!(3));
        assert_eq!(lvl.peek().unwrap().order_id, a_id);
    }

    #[test]
    fn fill_head_removes_exactly_one_entry_when_exhausted() {
        let mut lvl = PriceLevel::new(dec!(100));
        lvl.enqueue(order(dec!(1)));
        lvl.enqueue(order(dec!(1)));

        let (maker, trade_qty) = lvl.fill_head(dec!(1)).unwrap();
        assert_eq!(trade_qty, dec!(1));
        assert_eq!(maker.quantity, Decimal::ZERO);
        assert_eq!(lvl.order_count(), 1);
        assert_eq!(lvl.total_qty, dec!(1));
    }

    #[test]
    fn fill_head_partial_keeps_entry_in_queue() {
        let mut lvl = PriceLevel::new(dec!(100));
        lvl.enqueue(order(dec!(5)));

        let (maker, trade_qty) = lvl.fill_head(dec!(2)).unwrap();
        assert_eq!(trade_qty, dec!(2));
        assert_eq!(maker.quantity, dec!(3));
        assert_eq!(lvl.order_count(), 1);
        assert_eq!(lvl.total_qty, dec!(3));
        assert!(!lvl.is_empty());
    }

    #[test]
    fn empty_when_total_qty_and_queue_agree() {
        let mut lvl = PriceLevel::new(dec!(100));
        assert!(lvl.is_empty());
        lvl.enqueue(order(dec!(1)));
        assert!(!lvl.is_empty());
        lvl.fill_head(dec!(1));
        assert!(lvl.is_empty());
    }
}
