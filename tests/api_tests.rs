use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};

use order_book_engine::{
    api::{OrderAck, router},
    state::AppState,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use urlencoding::encode;

fn test_app() -> Router {
    router(AppState::new())
}

async fn body_json(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn json<T: serde::de::DeserializeOwned>(res: Response) -> T {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_order_rejects_zero_qty() {
    let app = test_app();

    let body = json!({
        "side": "buy",
        "order_type": "limit",
        "price": "50",
        "quantity": "0",
        "symbol": "BTC-USD"
    });

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["error"], "quantity must be > 0");
}

#[tokio::test]
async fn create_order_rejects_limit_without_price() {
    let app = test_app();

    let body = json!({
        "side": "buy",
        "order_type": "limit",
        "quantity": "1",
        "symbol": "BTC-USD"
    });

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_order_malformed_json_yields_422_from_loggedjson() {
    let app = test_app();

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from("{ this is not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn limit_order_rests_and_shows_up_in_book() {
    let app = test_app();

    let create = json!({
        "side": "buy",
        "order_type": "limit",
        "price": "48",
        "quantity": "10",
        "symbol": "BTC-USD"
    });

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(create.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let ack: OrderAck = json(res).await;
    assert_eq!(ack.status, order_book_engine::orders::OrderStatus::Accepted);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/book/BTC-USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let snap = body_json(res).await;
    assert_eq!(snap["bids"][0][0], "48");
}

#[tokio::test]
async fn market_order_crosses_a_resting_limit_and_produces_a_trade() {
    let app = test_app();

    let seed = json!({
        "side": "sell",
        "order_type": "limit",
        "price": "52",
        "quantity": "3",
        "symbol": "BTC-USD"
    });
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(seed.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let take = json!({
        "side": "buy",
        "order_type": "market",
        "quantity": "1",
        "symbol": "BTC-USD"
    });
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(take.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack: OrderAck = json(res).await;
    assert_eq!(ack.status, order_book_engine::orders::OrderStatus::Filled);
    assert_eq!(ack.trades.len(), 1);
}

#[tokio::test]
async fn trades_endpoint_paginates_forward() {
    let app = test_app();

    let seed = json!({
        "side": "sell",
        "order_type": "limit",
        "price": "52",
        "quantity": "3",
        "symbol": "BTC-USD"
    });
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(seed.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let market_buy = |qty: &str| {
        json!({
            "side": "buy",
            "order_type": "market",
            "quantity": qty,
            "symbol": "BTC-USD"
        })
    };

    for _ in 0..2 {
        let _ = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orders")
                    .header("content-type", "application/json")
                    .body(Body::from(market_buy("1").to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/trades/BTC-USD?limit=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page1 = body_json(res).await;
    assert_eq!(page1["items"].as_array().unwrap().len(), 1);
    let next = page1["next"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/trades/BTC-USD?limit=1&after={}", encode(next)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page2 = body_json(res).await;
    assert_eq!(page2["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn book_on_an_untouched_symbol_is_empty_not_an_error() {
    let app = test_app();

    let res = app
        .oneshot(
            Request::builder()
                .uri("/book/NOBODY-TRADES-THIS")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let snap = body_json(res).await;
    assert!(snap["bids"].as_array().unwrap().is_empty());
    assert!(snap["asks"].as_array().unwrap().is_empty());
}
