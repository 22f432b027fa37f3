use crate::book_side::BookSide;
use crate::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best bid/offer: the pair `(best_bid, best_ask)` with their total
/// resting quantities at those prices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bbo {
    pub bid: Option<(Decimal, Decimal)>,
    pub ask: Option<(Decimal, Decimal)>,
}

/// A pair of book sides for one symbol. Thin composition; no matching
/// logic lives here — see [`crate::engine`] for that.
pub struct OrderBook {
    pub symbol: Symbol,
    pub bids: BookSide,
    pub asks: BookSide,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BookSide::new(true),
            asks: BookSide::new(false),
        }
    }

    pub fn best_bid(&mut self) -> Option<(Decimal, Decimal)> {
        let price = self.bids.best_price()?;
        let qty = self.bids.get_level(price)?.total_qty;
        Some((price.normalize(), qty.normalize()))
    }

    pub fn best_ask(&mut self) -> Option<(Decimal, Decimal)> {
        let price = self.asks.best_price()?;
        let qty = self.asks.get_level(price)?.total_qty;
        Some((price.normalize(), qty.normalize()))
    }

    pub fn bbo(&mut self) -> Bbo {
        Bbo {
            bid: self.best_bid(),
            ask: self.best_ask(),
        }
    }

    /// The top `n` levels on each side, descending bids / ascending asks.
    pub fn depth(&self, n: usize) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        (self.bids.depth(n), self.asks.depth(n))
    }

    /// `bids < asks` (or at least one side empty) must hold after every
    /// submit completes; exposed so the matching core and property tests
    /// can both check it without duplicating the comparison.
    pub fn books_do_not_cross(&mut self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid < ask,
            _ => true,
        }
    }
}

/// A JSON-serializable snapshot of a book, depth-10 by default, suitable
/// for a REST response or a WebSocket market-data frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub bbo: Bbo,
}

impl BookSnapshot {
    pub const DEFAULT_DEPTH: usize = 10;

    pub fn from_book(book: &mut OrderBook) -> Self {
        let (bids, asks) = book.depth(Self::DEFAULT_DEPTH);
        let bbo = book.bbo();
        Self {
            symbol: book.symbol.clone(),
            bids,
            asks,
            bbo,
        }
    }

    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Vec::new(),
            asks: Vec::new(),
            bbo: Bbo::default(),
        }
    }
}
