//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{GameMatch, MatchHandle};
use crate::ws::registry::ConnectionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub match_handle: MatchHandle,
}

impl AppState {
    /// Build the state and the match it fronts. The caller spawns the match.
    pub fn new(config: Config, seed: u64) -> (Self, GameMatch) {
        let config = Arc::new(config);

        // Initialize connection registry
        let connections = Arc::new(ConnectionRegistry::new());

        // Initialize the single match
        let (game_match, match_handle) = GameMatch::new(seed, config.dev_mode, connections.clone());

        let state = Self {
            config,
            connections,
            match_handle,
        };

        (state, game_match)
    }
}
