use crate::price_level::PriceLevel;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// Unifies a max-heap-of-prices (bids) and a min-heap-of-prices (asks)
/// behind one type, the way the teacher's `EitherIter` unifies forward and
/// reverse `BTreeMap` iteration for the two sides of the book.
///
/// `BinaryHeap` is always a max-heap; asks wrap the price in `Reverse` so
/// its "maximum" is the numerically smallest price.
enum PriceHeap {
    Bid(BinaryHeap<Decimal>),
    Ask(BinaryHeap<Reverse<Decimal>>),
}

impl PriceHeap {
    fn push(&mut self, price: Decimal) {
        match self {
            PriceHeap::Bid(h) => h.push(price),
            PriceHeap::Ask(h) => h.push(Reverse(price)),
        }
    }

    fn peek(&self) -> Option<Decimal> {
        match self {
            PriceHeap::Bid(h) => h.peek().copied(),
            PriceHeap::Ask(h) => h.peek().map(|Reverse(p)| *p),
        }
    }

    fn pop(&mut self) {
        match self {
            PriceHeap::Bid(h) => {
                h.pop();
            }
            PriceHeap::Ask(h) => {
                h.pop();
            }
        }
    }
}

/// One side (bids or asks) of a single symbol's order book: a map from
/// price to [`PriceLevel`] plus a lazily-collapsed priority structure over
/// non-empty prices.
///
/// Stale entries — prices whose level has since been removed from `levels`
/// or drained to zero — are left in the heap and skipped (and popped) only
/// when encountered at the top, on a call to [`BookSide::best_price`].
/// Resting orders churn far faster than price levels, so paying to remove
/// a level from the heap eagerly, when it might be recreated on the very
/// next order, is avoided.
pub struct BookSide {
    pub is_bid: bool,
    levels: BTreeMap<Decimal, PriceLevel>,
    heap: PriceHeap,
}

impl BookSide {
    pub fn new(is_bid: bool) -> Self {
        Self {
            is_bid,
            levels: BTreeMap::new(),
            heap: if is_bid {
                PriceHeap::Bid(BinaryHeap::new())
            } else {
                PriceHeap::Ask(BinaryHeap::new())
            },
        }
    }

    /// The best active price, discarding stale heap entries as it goes.
    /// Returns `None` once every entry has been discarded (side empty).
    pub fn best_price(&mut self) -> Option<Decimal> {
        loop {
            let top = self.heap.peek()?;
            match self.levels.get(&top) {
                Some(lvl) if !lvl.is_empty() => return Some(top),
                _ => self.heap.pop(),
            }
        }
    }

    /// Idempotent: returns the existing level, or creates and registers a
    /// new one in both the map and the priority structure.
    pub fn get_or_create_level(&mut self, price: Decimal) -> &mut PriceLevel {
        if !self.levels.contains_key(&price) {
            self.levels.insert(price, PriceLevel::new(price));
            self.heap.push(price);
        }
        self.levels.get_mut(&price).expect("just inserted")
    }

    pub fn get_level_mut(&mut self, price: Decimal) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    pub fn get_level(&self, price: Decimal) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Remove the map entry when the level has become empty. Does not
    /// touch the heap; its stale entry is collapsed lazily.
    pub fn remove_level_if_empty(&mut self, price: Decimal) {
        if let Some(lvl) = self.levels.get(&price) {
            if lvl.is_empty() {
                self.levels.remove(&price);
            }
        }
    }

    /// A finite, monotonic walk of currently non-empty prices in match
    /// order (descending for bids, ascending for asks), optionally
    /// filtered to prices at or better than `limit`.
    pub fn iter_matchable_prices(&self, limit: Option<Decimal>) -> Vec<Decimal> {
        let mut prices: Vec<Decimal> = self
            .levels
            .iter()
            .filter(|(_, lvl)| !lvl.is_empty())
            .map(|(p, _)| *p)
            .filter(|p| match limit {
                None => true,
                Some(l) => {
                    if self.is_bid {
                        *p >= l
                    } else {
                        *p <= l
                    }
                }
            })
            .collect();
        if self.is_bid {
            prices.sort_by(|a, b| b.cmp(a));
        } else {
            prices.sort();
        }
        prices
    }

    /// The top `n` non-empty levels in match order, as `(price, total_qty)`.
    /// Both values are normalized (trailing zeroes trimmed) since this is
    /// an outbound-facing read, not a value fed back into matching.
    pub fn depth(&self, n: usize) -> Vec<(Decimal, Decimal)> {
        self.iter_matchable_prices(None)
            .into_iter()
            .take(n)
            .map(|p| (p.normalize(), self.levels[&p].total_qty.normalize()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.values().all(|lvl| lvl.is_empty())
    }
}
