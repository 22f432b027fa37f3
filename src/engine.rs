//! The matching core (C4): validation, the FOK all-or-nothing pre-check,
//! the price-time-priority matching loop, and the per-symbol actor that
//! gives every submission to a symbol a total order without an explicit
//! lock (see SPEC_FULL.md §4.4/§5 for the design rationale).

use crate::errors::{EngineError, EngineResult};
use crate::orderbook::{Bbo, BookSnapshot, OrderBook};
use crate::orders::{Order, OrderStatus, OrderType, RestingOrder, Side};
use crate::pubsub::PublicationBus;
use crate::symbol::Symbol;
use crate::trade::Trade;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The result envelope handed back from a `submit` call.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub status: OrderStatus,
    pub order_id: Uuid,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub trades: Vec<Trade>,
}

/// Request parameters for `submit`, pre-validation.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

/// Validate a submit request per spec.md §4.4. Validation fails fast,
/// before any id/timestamp is minted and before any per-symbol state is
/// touched.
fn validate(req: &NewOrderRequest) -> EngineResult<()> {
    if req.quantity <= Decimal::ZERO {
        return Err(EngineError::InvalidArgument(
            "quantity must be > 0".into(),
        ));
    }
    match req.order_type {
        OrderType::Market => {}
        OrderType::Limit | OrderType::Ioc | OrderType::Fok => match req.price {
            Some(p) if p > Decimal::ZERO => {}
            _ => {
                return Err(EngineError::InvalidArgument(
                    "price must be > 0 for limit/ioc/fok orders".into(),
                ));
            }
        },
    }
    Ok(())
}

/// Walk the opposite side's matchable prices, summing total quantity,
/// until the order's quantity is met or the side is exhausted. FOK must
/// see this exact sum before committing to any match, since it is not
/// allowed partial execution visibility.
fn fok_can_fill(book: &mut OrderBook, side: Side, quantity: Decimal, price: Decimal) -> bool {
    let opp = match side.opposite() {
        Side::Buy => &mut book.bids,
        Side::Sell => &mut book.asks,
    };
    let mut need = quantity;
    for p in opp.iter_matchable_prices(Some(price)) {
        if need <= Decimal::ZERO {
            break;
        }
        let lvl_qty = opp.get_level(p).map(|l| l.total_qty).unwrap_or(Decimal::ZERO);
        need -= lvl_qty;
    }
    need <= Decimal::ZERO
}

/// The price-time-priority matching loop shared by market, limit, IOC and
/// post-precheck FOK orders. Mutates `book` in place and returns the
/// trades produced, in execution order.
fn run_matching_loop(book: &mut OrderBook, order: &Order, remaining: &mut Decimal) -> Vec<Trade> {
    let mut trades = Vec::new();
    let limit_price = match order.order_type {
        OrderType::Limit | OrderType::Ioc | OrderType::Fok => order.price,
        OrderType::Market => None,
    };

    loop {
        if *remaining <= Decimal::ZERO {
            break;
        }
        let opp = match order.side {
            Side::Buy => &mut book.asks,
            Side::Sell => &mut book.bids,
        };
        let Some(best) = opp.best_price() else {
            break;
        };
        if let Some(limit) = limit_price {
            let crosses = match order.side {
                Side::Buy => best > limit,
                Side::Sell => best < limit,
            };
            if crosses {
                break;
            }
        }

        let lvl = opp
            .get_level_mut(best)
            .expect("best_price only returns prices with a live level");
        while *remaining > Decimal::ZERO && !lvl.is_empty() {
            let maker_before = lvl.peek().expect("non-empty level has a head").clone();
            let (maker_after, trade_qty) = lvl
                .fill_head(*remaining)
                .expect("non-empty level has a head");
            *remaining -= trade_qty;

            trades.push(Trade {
                trade_id: Uuid::new_v4(),
                symbol: order.symbol.clone(),
                price: best.normalize(),
                quantity: trade_qty.normalize(),
                aggressor_side: order.side,
                maker_order_id: maker_before.order_id,
                taker_order_id: order.order_id,
                timestamp: Utc::now(),
            });
            debug_assert_eq!(maker_after.order_id, maker_before.order_id);
        }
        opp.remove_level_if_empty(best);
    }

    trades
}

/// Run the full matching algorithm for one order against one book:
/// validation has already happened, the id/timestamp are already minted,
/// and the caller holds exclusive access to `book` (the symbol actor's
/// turn). Returns the disposition and trades, per spec.md §4.4's
/// post-loop disposition table.
pub fn match_order(book: &mut OrderBook, order: Order) -> EngineResult<SubmitOutcome> {
    if order.order_type == OrderType::Fok {
        let price = order
            .price
            .expect("validated: fok orders always carry a price");
        if !fok_can_fill(book, order.side, order.quantity, price) {
            return Ok(SubmitOutcome {
                status: OrderStatus::Rejected,
                order_id: order.order_id,
                filled_quantity: Decimal::ZERO,
                remaining_quantity: order.quantity,
                trades: Vec::new(),
            });
        }
    }

    let mut remaining = order.quantity;
    let trades = run_matching_loop(book, &order, &mut remaining);

    if remaining < Decimal::ZERO {
        error!(
            order_id = %order.order_id,
            %remaining,
            "matching loop produced negative remaining quantity"
        );
        return Err(EngineError::InvariantViolation(
            "remaining_quantity went negative".into(),
        ));
    }

    let filled_quantity: Decimal = trades.iter().map(|t| t.quantity).sum();
    debug_assert_eq!(filled_quantity, order.quantity - remaining);

    let status = if remaining.is_zero() {
        OrderStatus::Filled
    } else {
        match order.order_type {
            OrderType::Limit => {
                let resting = RestingOrder::from_order(&order, remaining);
                let side = match order.side {
                    Side::Buy => &mut book.bids,
                    Side::Sell => &mut book.asks,
                };
                side.get_or_create_level(resting.price).enqueue(resting);
                OrderStatus::Accepted
            }
            OrderType::Ioc | OrderType::Market => OrderStatus::Canceled,
            OrderType::Fok => {
                // The pre-check guarantees this is unreachable; treat it as
                // a fatal invariant violation rather than silently
                // returning a half-filled FOK.
                error!(order_id = %order.order_id, "fok order left a residual after pre-check passed");
                return Err(EngineError::InvariantViolation(
                    "fok residual after successful pre-check".into(),
                ));
            }
        }
    };

    if !book.books_do_not_cross() {
        error!(order_id = %order.order_id, "book crossed after matching completed");
        return Err(EngineError::InvariantViolation(
            "bids and asks crossed after match".into(),
        ));
    }

    Ok(SubmitOutcome {
        status,
        order_id: order.order_id,
        filled_quantity: filled_quantity.normalize(),
        remaining_quantity: remaining.normalize(),
        trades,
    })
}

/// Bounded in-memory ring of recently executed trades for one symbol,
/// backing `GET /trades/{symbol}`. Not persisted: spec.md's Non-goals
/// exclude persistence/replay, so this is purely a read-side convenience
/// over what the actor already produced, not a durable store.
struct RecentTrades {
    capacity: usize,
    next_seq: u64,
    items: VecDeque<(u64, Trade)>,
}

impl RecentTrades {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: 0,
            items: VecDeque::new(),
        }
    }

    fn push(&mut self, trade: Trade) {
        self.next_seq += 1;
        self.items.push_back((self.next_seq, trade));
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    fn page_after(&self, after: Option<u64>, limit: usize) -> (Vec<Trade>, Option<u64>) {
        let start = after.unwrap_or(0);
        let mut iter = self.items.iter().filter(|(seq, _)| *seq > start);
        let mut out = Vec::with_capacity(limit.min(self.items.len()));
        let mut last_seq = start;
        for (seq, trade) in iter.by_ref().take(limit) {
            out.push(trade.clone());
            last_seq = *seq;
        }
        // Look-ahead: only surface a cursor if there's strictly more beyond
        // what we just returned, mirroring the teacher's durable-store
        // pagination style.
        let has_more = iter.next().is_some();
        (out, if has_more { Some(last_seq) } else { None })
    }
}

enum ActorMsg {
    Submit {
        order_type: OrderType,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        reply: oneshot::Sender<EngineResult<SubmitOutcome>>,
    },
    Bbo {
        reply: oneshot::Sender<Bbo>,
    },
    Snapshot {
        reply: oneshot::Sender<BookSnapshot>,
    },
    Depth {
        levels: usize,
        reply: oneshot::Sender<(Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>)>,
    },
    RecentTrades {
        after: Option<u64>,
        limit: usize,
        reply: oneshot::Sender<(Vec<Trade>, Option<u64>)>,
    },
}

const RECENT_TRADES_CAPACITY: usize = 10_000;

/// The single-consumer task that owns one symbol's book exclusively.
/// Everything it does runs to completion before it pulls the next
/// message off `rx`, which is what gives submissions for this symbol a
/// total order without a lock: the order in which messages are sent is
/// the order in which they are handled.
async fn run_symbol_actor(
    symbol: Symbol,
    mut rx: mpsc::UnboundedReceiver<ActorMsg>,
    bus: Arc<PublicationBus>,
) {
    let mut book = OrderBook::new(symbol.clone());
    let mut recent = RecentTrades::new(RECENT_TRADES_CAPACITY);

    while let Some(msg) = rx.recv().await {
        match msg {
            ActorMsg::Submit {
                order_type,
                side,
                quantity,
                price,
                reply,
            } => {
                let order = Order {
                    order_id: Uuid::new_v4(),
                    symbol: symbol.clone(),
                    side,
                    order_type,
                    quantity,
                    price,
                    timestamp: Utc::now(),
                };
                info!(order_id = %order.order_id, symbol = %symbol, side = ?side, order_type = ?order_type, "matching incoming order");
                let outcome = match_order(&mut book, order);

                if let Ok(outcome) = &outcome {
                    for trade in &outcome.trades {
                        warn!(trade_id = %trade.trade_id, price = %trade.price, quantity = %trade.quantity, "emitting trade");
                        recent.push(trade.clone());
                    }
                    // Publication happens synchronously, inside this turn,
                    // after mutation and before the next message is
                    // dequeued — that keeps publications for a symbol in
                    // the same order as the matches that produced them.
                    let snapshot = BookSnapshot::from_book(&mut book);
                    bus.publish_market_data(&symbol, snapshot);
                    for trade in &outcome.trades {
                        bus.publish_trade(&symbol, trade.clone());
                    }
                }

                let _ = reply.send(outcome);
            }
            ActorMsg::Bbo { reply } => {
                let _ = reply.send(book.bbo());
            }
            ActorMsg::Snapshot { reply } => {
                let _ = reply.send(BookSnapshot::from_book(&mut book));
            }
            ActorMsg::Depth { levels, reply } => {
                let _ = reply.send(book.depth(levels));
            }
            ActorMsg::RecentTrades {
                after,
                limit,
                reply,
            } => {
                let _ = reply.send(recent.page_after(after, limit));
            }
        }
    }
}

/// A handle to the matching engine: lazily spawns one actor task per
/// symbol on first use and routes every operation for that symbol to it.
#[derive(Clone)]
pub struct Engine {
    actors: Arc<Mutex<HashMap<Symbol, mpsc::UnboundedSender<ActorMsg>>>>,
    bus: Arc<PublicationBus>,
}

impl Engine {
    pub fn new(bus: Arc<PublicationBus>) -> Self {
        Self {
            actors: Arc::new(Mutex::new(HashMap::new())),
            bus,
        }
    }

    /// The shared market-data/trade bus, for callers (the WS frontend)
    /// that need to subscribe directly rather than round-trip an actor.
    pub fn bus(&self) -> Arc<PublicationBus> {
        self.bus.clone()
    }

    async fn actor_for(&self, symbol: &Symbol) -> mpsc::UnboundedSender<ActorMsg> {
        let mut actors = self.actors.lock().await;
        if let Some(tx) = actors.get(symbol) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_symbol_actor(symbol.clone(), rx, self.bus.clone()));
        actors.insert(symbol.clone(), tx.clone());
        tx
    }

    /// `submit(symbol, order_type, side, quantity, price?) -> result`,
    /// spec.md §6's one core operation. Validation happens here, before
    /// any actor is created or touched.
    pub async fn submit(&self, req: NewOrderRequest) -> EngineResult<SubmitOutcome> {
        validate(&req)?;
        let tx = self.actor_for(&req.symbol).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ActorMsg::Submit {
            order_type: req.order_type,
            side: req.side,
            quantity: req.quantity,
            price: req.price,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::ActorGone)?;
        reply_rx.await.map_err(|_| EngineError::ActorGone)?
    }

    pub async fn bbo(&self, symbol: &Symbol) -> Bbo {
        let tx = self.actor_for(symbol).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(ActorMsg::Bbo { reply: reply_tx }).is_err() {
            return Bbo::default();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn snapshot(&self, symbol: &Symbol) -> BookSnapshot {
        let tx = self.actor_for(symbol).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(ActorMsg::Snapshot { reply: reply_tx }).is_err() {
            return BookSnapshot::empty(symbol.clone());
        }
        reply_rx
            .await
            .unwrap_or_else(|_| BookSnapshot::empty(symbol.clone()))
    }

    pub async fn depth(
        &self,
        symbol: &Symbol,
        levels: usize,
    ) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        let tx = self.actor_for(symbol).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx
            .send(ActorMsg::Depth { levels, reply: reply_tx })
            .is_err()
        {
            return (Vec::new(), Vec::new());
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn recent_trades(
        &self,
        symbol: &Symbol,
        after: Option<u64>,
        limit: usize,
    ) -> (Vec<Trade>, Option<u64>) {
        let tx = self.actor_for(symbol).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx
            .send(ActorMsg::RecentTrades {
                after,
                limit,
                reply: reply_tx,
            })
            .is_err()
        {
            return (Vec::new(), None);
        }
        reply_rx.await.unwrap_or((Vec::new(), None))
    }
}
