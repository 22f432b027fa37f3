use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::{
    engine::NewOrderRequest,
    errors::EngineError,
    orderbook::BookSnapshot,
    orders::{OrderStatus, OrderType, Side},
    pubsub::{ChannelSink, Sink},
    state::AppState,
    symbol::Symbol,
    trade::Trade,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);

fn err(status: StatusCode, msg: impl Into<String>) -> ApiErr {
    (status, Json(json!({ "error": msg.into() })))
}

fn log_rejected(payload: &NewOrder, reason: &str) {
    warn!(
        reason,
        side = ?payload.side,
        order_type = ?payload.order_type,
        price = ?payload.price,
        quantity = %payload.quantity,
        symbol = %payload.symbol,
        "order rejected"
    );
}

/// A JSON body extractor that logs the raw body on a deserialization
/// failure, truncated to a sane preview length so a malformed giant
/// payload doesn't flood the logs.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "order rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
            }
        }
    }
}

fn default_limit() -> usize {
    100
}

const MAX_TRADES_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct TradesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    after: Option<String>,
}

#[derive(Serialize)]
pub struct TradesPage {
    items: Vec<Trade>,
    next: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Cursor {
    v: u8,
    seq: u64,
}

fn encode_cursor(seq: u64) -> String {
    B64.encode(serde_json::to_vec(&Cursor { v: 1, seq }).unwrap())
}

fn decode_cursor(s: &str) -> Result<u64, ApiErr> {
    let bytes = B64
        .decode(s)
        .map_err(|_| err(StatusCode::BAD_REQUEST, "invalid cursor"))?;
    let c: Cursor =
        serde_json::from_slice(&bytes).map_err(|_| err(StatusCode::BAD_REQUEST, "invalid cursor"))?;
    if c.v != 1 {
        return Err(err(StatusCode::BAD_REQUEST, "invalid cursor"));
    }
    Ok(c.seq)
}

/// Request payload for `POST /orders`.
#[derive(serde::Deserialize)]
pub struct NewOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

/// A websocket message, either a market-data snapshot or a single trade,
/// serialized as an internally-tagged enum:
/// ```json
/// {"type": "book_snapshot", "data": { ... }}
/// {"type": "trade", "data": { ... }}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsFrame {
    BookSnapshot(BookSnapshot),
    Trade(Trade),
}

/// Response for `POST /orders`.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct OrderAck {
    pub status: OrderStatus,
    pub order_id: uuid::Uuid,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub trades: Vec<Trade>,
}

/// `POST /orders` — submit an order.
///
/// *Success:* 200, JSON [`OrderAck`] with `status` in
/// `filled`/`accepted`/`canceled`/`rejected`.
/// *Invalid argument:* 400, JSON `{"error": "..."}`, book untouched.
/// *Invariant violation:* 500, JSON `{"error": "internal_error"}` — the
/// detail is logged, not leaked to the caller.
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<NewOrder>,
) -> Result<Json<OrderAck>, ApiErr> {
    let req = NewOrderRequest {
        symbol: payload.symbol.clone(),
        order_type: payload.order_type,
        side: payload.side,
        quantity: payload.quantity,
        price: payload.price,
    };

    match state.engine.submit(req).await {
        Ok(outcome) => Ok(Json(OrderAck {
            status: outcome.status,
            order_id: outcome.order_id,
            filled_quantity: outcome.filled_quantity,
            remaining_quantity: outcome.remaining_quantity,
            trades: outcome.trades,
        })),
        Err(EngineError::InvalidArgument(msg)) => {
            log_rejected(&payload, &msg);
            Err(err(StatusCode::BAD_REQUEST, msg))
        }
        Err(EngineError::InvariantViolation(msg)) => {
            error!(error = %msg, symbol = %payload.symbol, "invariant violation during matching");
            Err(err(StatusCode::INTERNAL_SERVER_ERROR, "internal_error"))
        }
        Err(EngineError::ActorGone) => {
            error!(symbol = %payload.symbol, "symbol actor unreachable");
            Err(err(StatusCode::INTERNAL_SERVER_ERROR, "internal_error"))
        }
    }
}

/// `GET /book/{symbol}` — a depth-10 snapshot plus BBO.
pub async fn get_order_book(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let symbol = Symbol::new(symbol);
    let snapshot = state.engine.snapshot(&symbol).await;
    Json(snapshot).into_response()
}

/// `GET /trades/{symbol}?limit=&after=` — the most recently executed
/// trades for a symbol, forward-paginated. Backed by an in-memory ring
/// buffer inside the symbol's actor, not a durable store (spec's
/// Non-goals exclude persistence/replay).
pub async fn get_trade_log(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Query(q): Query<TradesQuery>,
) -> Result<Json<TradesPage>, ApiErr> {
    let symbol = Symbol::new(symbol);
    let limit = q.limit.min(MAX_TRADES_LIMIT);
    let after = match q.after {
        Some(s) => Some(decode_cursor(&s)?),
        None => None,
    };
    let (items, next_seq) = state.engine.recent_trades(&symbol, after, limit).await;
    Ok(Json(TradesPage {
        items,
        next: next_seq.map(encode_cursor),
    }))
}

/// `GET /ws/{symbol}` — upgrade to a WebSocket streaming an initial
/// [`BookSnapshot`], then live `BookSnapshot`/`Trade` frames for this
/// symbol as they are published.
pub async fn ws_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Symbol::new(symbol)))
}

pub async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: Symbol) {
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel::<WsFrame>();

    let md_sink: Arc<dyn Sink<BookSnapshot>> = Arc::new(ChannelSink::new({
        let tx = frame_tx.clone();
        let (md_tx, mut md_rx) = tokio::sync::mpsc::unbounded_channel::<BookSnapshot>();
        tokio::spawn(async move {
            while let Some(snap) = md_rx.recv().await {
                if tx.send(WsFrame::BookSnapshot(snap)).is_err() {
                    break;
                }
            }
        });
        md_tx
    }));
    let trade_sink: Arc<dyn Sink<Trade>> = Arc::new(ChannelSink::new({
        let tx = frame_tx.clone();
        let (trade_tx, mut trade_rx) = tokio::sync::mpsc::unbounded_channel::<Trade>();
        tokio::spawn(async move {
            while let Some(trade) = trade_rx.recv().await {
                if tx.send(WsFrame::Trade(trade)).is_err() {
                    break;
                }
            }
        });
        trade_tx
    }));

    let bus = state.engine.bus();
    let md_id = bus.subscribe_market_data(&symbol, md_sink);
    let trade_id = bus.subscribe_trades(&symbol, trade_sink);

    let initial = state.engine.snapshot(&symbol).await;
    if socket
        .send(Message::Text(
            serde_json::to_string(&WsFrame::BookSnapshot(initial))
                .unwrap()
                .into(),
        ))
        .await
        .is_err()
    {
        bus.unsubscribe_market_data(&symbol, md_id);
        bus.unsubscribe_trades(&symbol, trade_id);
        return;
    }

    while let Some(frame) = frame_rx.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "failed to serialize ws frame");
                continue;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }

    bus.unsubscribe_market_data(&symbol, md_id);
    bus.unsubscribe_trades(&symbol, trade_id);
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/book/{symbol}", get(get_order_book))
        .route("/trades/{symbol}", get(get_trade_log))
        .route("/ws/{symbol}", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
