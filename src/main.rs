use axum::Router;
use clap::Parser;
use order_book_engine::cli::{Cli, Commands};
use order_book_engine::engine::match_order;
use order_book_engine::orderbook::OrderBook;
use order_book_engine::orders::{Order, OrderType, Side};
use order_book_engine::symbol::Symbol;
use order_book_engine::utils::shutdown_token;
use order_book_engine::{api, state::AppState};
use rust_decimal::Decimal;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

async fn get_app_listener(port: u16, state: AppState) -> anyhow::Result<(TcpListener, Router)> {
    let app = api::router(state);
    let ep = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(ep).await?;
    Ok((listener, app))
}

/// Seed `depth` ask price levels with `orders_per_level` resting orders
/// each, then sweep the whole book with one aggressive market buy, timing
/// just the sweep. A smoke test for the matching core's throughput
/// without a server or a client in the loop.
fn run_bench(depth: usize, orders_per_level: usize) {
    let symbol = Symbol::new("BTC-USDT");
    let mut book = OrderBook::new(symbol.clone());

    let mut total_resting = Decimal::ZERO;
    for level in 0..depth {
        let price = Decimal::from(100 + level as i64);
        for _ in 0..orders_per_level {
            let order = Order {
                order_id: uuid::Uuid::new_v4(),
                symbol: symbol.clone(),
                side: Side::Sell,
                order_type: OrderType::Limit,
                quantity: Decimal::ONE,
                price: Some(price),
                timestamp: chrono::Utc::now(),
            };
            match_order(&mut book, order).expect("seeding should never violate an invariant");
            total_resting += Decimal::ONE;
        }
    }

    let sweep = Order {
        order_id: uuid::Uuid::new_v4(),
        symbol,
        side: Side::Buy,
        order_type: OrderType::Market,
        quantity: total_resting,
        price: None,
        timestamp: chrono::Utc::now(),
    };

    let start = Instant::now();
    let outcome = match_order(&mut book, sweep).expect("sweep should never violate an invariant");
    let elapsed = start.elapsed();

    println!(
        "bench: depth={depth} orders_per_level={orders_per_level} trades={} filled={} elapsed={:?}",
        outcome.trades.len(),
        outcome.filled_quantity,
        elapsed
    );
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let state = AppState::new();
    let token = shutdown_token();
    let (listener, app) = get_app_listener(port, state).await?;
    tracing::info!("HTTP/WS server listening on 0.0.0.0:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}

/// Not `#[tokio::main]`: `--workers` picks the runtime's worker-thread
/// count, which has to be decided before the runtime is built, so the CLI
/// is parsed on a plain, non-async `main` first.
fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port, workers } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(workers)
                .enable_all()
                .build()?;
            runtime.block_on(run_server(port))?;
        }
        Commands::Bench { depth, orders_per_level } => {
            run_bench(depth, orders_per_level);
        }
    }
    Ok(())
}
