//! Application state shared across routes

use std::sync::Arc;

use rand::RngCore;

use crate::config::Config;
use crate::game::GameServer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: Arc<GameServer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let game = Arc::new(GameServer::new(rand::thread_rng().next_u64()));

        Self { config, game }
    }
}
