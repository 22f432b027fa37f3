//! The publication bus (C5): a topic-keyed broadcaster that decouples the
//! matching core from whatever is listening for market-data and trade
//! events, the way the source's `PubSub` decouples the engine from raw
//! websocket connections.

use crate::orderbook::BookSnapshot;
use crate::symbol::Symbol;
use crate::trade::Trade;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Opaque handle returned by `subscribe`, passed back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Anything that can receive a best-effort, non-blocking delivery.
///
/// A failing or slow sink must not block or affect any other sink; a
/// `send` that returns `false` marks the sink dead so future broadcasts
/// stop bothering it, but does not retry and does not propagate an error
/// anywhere.
pub trait Sink<T>: Send + Sync {
    fn send(&self, payload: &T) -> bool;
}

/// A channel-backed [`Sink`]: `send` is a synchronous, non-blocking push
/// onto an unbounded mpsc channel, with a separate task draining it (e.g.
/// into a websocket). This is the adapter the HTTP/WS frontend uses.
pub struct ChannelSink<T>(tokio::sync::mpsc::UnboundedSender<T>);

impl<T> ChannelSink<T> {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<T>) -> Self {
        Self(tx)
    }
}

impl<T: Clone + Send + Sync> Sink<T> for ChannelSink<T> {
    fn send(&self, payload: &T) -> bool {
        self.0.send(payload.clone()).is_ok()
    }
}

struct Topic<T> {
    next_id: AtomicU64,
    subs: Mutex<HashMap<u64, Arc<dyn Sink<T>>>>,
}

impl<T: Clone> Topic<T> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subs: Mutex::new(HashMap::new()),
        }
    }

    fn subscribe(&self, sink: Arc<dyn Sink<T>>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs.lock().expect("topic lock poisoned").insert(id, sink);
        SubscriptionId(id)
    }

    /// Removing a key that isn't present is a no-op, so calling this
    /// twice with the same id is equivalent to calling it once.
    fn unsubscribe(&self, id: SubscriptionId) {
        self.subs.lock().expect("topic lock poisoned").remove(&id.0);
    }

    /// Fan out to a snapshot of current subscribers. Each delivery is
    /// independent; a sink reporting failure is pruned after the fan-out
    /// completes, never blocking the sinks after it in the snapshot.
    fn broadcast(&self, payload: T) {
        let snapshot: Vec<(u64, Arc<dyn Sink<T>>)> = {
            let subs = self.subs.lock().expect("topic lock poisoned");
            subs.iter().map(|(id, sink)| (*id, sink.clone())).collect()
        };
        let mut dead = Vec::new();
        for (id, sink) in snapshot {
            if !sink.send(&payload) {
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            let mut subs = self.subs.lock().expect("topic lock poisoned");
            for id in dead {
                subs.remove(&id);
            }
        }
    }
}

/// Two topics per symbol — market-data snapshots and trades — created
/// lazily on first subscribe or publish. Safe under concurrent
/// subscribe/unsubscribe/broadcast from any number of callers.
pub struct PublicationBus {
    market_data: Mutex<HashMap<Symbol, Arc<Topic<BookSnapshot>>>>,
    trades: Mutex<HashMap<Symbol, Arc<Topic<Trade>>>>,
}

impl PublicationBus {
    pub fn new() -> Self {
        Self {
            market_data: Mutex::new(HashMap::new()),
            trades: Mutex::new(HashMap::new()),
        }
    }

    fn md_topic(&self, symbol: &Symbol) -> Arc<Topic<BookSnapshot>> {
        let mut topics = self.market_data.lock().expect("bus lock poisoned");
        topics
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Topic::new()))
            .clone()
    }

    fn trades_topic(&self, symbol: &Symbol) -> Arc<Topic<Trade>> {
        let mut topics = self.trades.lock().expect("bus lock poisoned");
        topics
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Topic::new()))
            .clone()
    }

    pub fn subscribe_market_data(
        &self,
        symbol: &Symbol,
        sink: Arc<dyn Sink<BookSnapshot>>,
    ) -> SubscriptionId {
        self.md_topic(symbol).subscribe(sink)
    }

    pub fn unsubscribe_market_data(&self, symbol: &Symbol, id: SubscriptionId) {
        self.md_topic(symbol).unsubscribe(id);
    }

    pub fn subscribe_trades(&self, symbol: &Symbol, sink: Arc<dyn Sink<Trade>>) -> SubscriptionId {
        self.trades_topic(symbol).subscribe(sink)
    }

    pub fn unsubscribe_trades(&self, symbol: &Symbol, id: SubscriptionId) {
        self.trades_topic(symbol).unsubscribe(id);
    }

    pub fn publish_market_data(&self, symbol: &Symbol, snapshot: BookSnapshot) {
        self.md_topic(symbol).broadcast(snapshot);
    }

    pub fn publish_trade(&self, symbol: &Symbol, trade: Trade) {
        self.trades_topic(symbol).broadcast(trade);
    }
}

impl Default for PublicationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        count: Arc<AtomicUsize>,
        alive: bool,
    }

    impl Sink<Trade> for CountingSink {
        fn send(&self, _payload: &Trade) -> bool {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.alive
        }
    }

    fn sample_trade() -> Trade {
        Trade {
            trade_id: uuid::Uuid::new_v4(),
            symbol: Symbol::new("BTC-USDT"),
            price: rust_decimal::Decimal::ONE,
            quantity: rust_decimal::Decimal::ONE,
            aggressor_side: crate::orders::Side::Buy,
            maker_order_id: uuid::Uuid::new_v4(),
            taker_order_id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber_independently() {
        let bus = PublicationBus::new();
        let symbol = Symbol::new("BTC-USDT");
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        bus.subscribe_trades(
            &symbol,
            Arc::new(CountingSink {
                count: count_a.clone(),
                alive: true,
            }),
        );
        bus.subscribe_trades(
            &symbol,
            Arc::new(CountingSink {
                count: count_b.clone(),
                alive: true,
            }),
        );

        bus.publish_trade(&symbol, sample_trade());

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_dead_sink_does_not_block_others_and_is_pruned() {
        let bus = PublicationBus::new();
        let symbol = Symbol::new("BTC-USDT");
        let dead_count = Arc::new(AtomicUsize::new(0));
        let alive_count = Arc::new(AtomicUsize::new(0));

        bus.subscribe_trades(
            &symbol,
            Arc::new(CountingSink {
                count: dead_count.clone(),
                alive: false,
            }),
        );
        bus.subscribe_trades(
            &symbol,
            Arc::new(CountingSink {
                count: alive_count.clone(),
                alive: true,
            }),
        );

        bus.publish_trade(&symbol, sample_trade());
        bus.publish_trade(&symbol, sample_trade());

        assert_eq!(dead_count.load(Ordering::SeqCst), 1, "pruned after first failure");
        assert_eq!(alive_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = PublicationBus::new();
        let symbol = Symbol::new("BTC-USDT");
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe_trades(
            &symbol,
            Arc::new(CountingSink {
                count: count.clone(),
                alive: true,
            }),
        );

        bus.unsubscribe_trades(&symbol, id);
        bus.unsubscribe_trades(&symbol, id);

        bus.publish_trade(&symbol, sample_trade());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
