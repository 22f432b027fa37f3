//! The `engine` binary's command surface: `serve` stands up the HTTP/WS
//! frontend, `bench` runs a one-shot in-process matching workload so the
//! core can be smoke-tested without a server or a client.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "engine")]
#[command(author, version, about = "A price-time-priority limit order book matching engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WS server.
    Serve {
        /// TCP port to listen on.
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Tokio worker thread count, matching the source's fixed-size
        /// thread pool as a visible, tunable parameter rather than a
        /// hardcoded constant.
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Run an in-process matching workload once and print a summary.
    Bench {
        /// Number of distinct resting price levels to seed.
        #[arg(long, default_value_t = 10)]
        depth: usize,
        /// Resting orders per seeded price level.
        #[arg(long, default_value_t = 100)]
        orders_per_level: usize,
    },
}
