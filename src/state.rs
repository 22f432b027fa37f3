use crate::engine::Engine;
use crate::pubsub::PublicationBus;
use std::sync::Arc;

/// Shared application state handed to every axum handler: one [`Engine`]
/// handle, which owns a lazily-spawned actor per symbol and a shared
/// [`PublicationBus`] for market-data/trade fan-out.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new() -> Self {
        let bus = Arc::new(PublicationBus::new());
        Self {
            engine: Engine::new(bus),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
