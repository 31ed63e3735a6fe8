//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entity::{EnemyKind, EntityId, ItemKind};
use crate::game::MatchPhase;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Request to join the lobby
    Join { username: String },

    /// Full held-key state, keyed by `KeyboardEvent.code`
    Input {
        #[serde(default)]
        keys: HashMap<String, bool>,
    },

    /// Lead player starts the countdown
    StartGame,

    PauseGame,

    ResumeGame,

    /// Leave the match for good
    QuitGame,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Confirmation of join, sent only to the joiner
    Joined {
        id: Uuid,
        username: String,
        is_lead_player: bool,
    },

    /// Join rejected, sent only to the requester
    JoinError { code: String, message: String },

    /// Lobby roster and match state
    LobbyState {
        state: MatchPhase,
        players: Vec<LobbyPlayer>,
        dev_mode: bool,
    },

    PlayerJoined { id: Uuid, username: String },

    PlayerLeft { id: Uuid, username: String },

    PlayerQuit { quit_by: PlayerRef },

    /// Countdown has begun
    GameStarted {},

    GamePaused { paused_by: PlayerRef },

    GameResumed { resumed_by: PlayerRef },

    /// Match is over
    GameEnded {
        winner: Option<LeaderboardEntry>,
        leaderboard: Vec<LeaderboardEntry>,
    },

    /// Full world state (sent every tick)
    GameState {
        entities: BTreeMap<String, EntitySnapshot>,
        /// Match seconds remaining
        timer: u64,
        /// Countdown seconds remaining
        countdown: u64,
        scores: BTreeMap<Uuid, u32>,
        is_paused: bool,
        paused_by: Option<PlayerRef>,
        match_state: MatchPhase,
    },

    /// Request rejected, sent only to the requester
    Error { code: String, message: String },
}

/// Lobby roster entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub id: Uuid,
    pub username: String,
    pub is_lead_player: bool,
}

/// Identity snapshot of whoever triggered an event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: String,
    pub username: String,
}

impl PlayerRef {
    pub fn player(id: Uuid, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
        }
    }

    /// The server itself, e.g. for an automatic resume
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            username: "System".to_string(),
        }
    }
}

/// Final standing of one player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: Uuid,
    pub username: String,
    pub score: u32,
    /// Whole seconds survived
    pub survival_time: u64,
}

/// One entity in a world snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum EntitySnapshot {
    Player {
        id: Uuid,
        username: String,
        x: f32,
        y: f32,
        rotation: f32,
        last_direction: f32,
        hp: i32,
        max_hp: i32,
        lives: u32,
        is_dead: bool,
        score: u32,
        /// Milliseconds survived this match
        survival_time: u64,
    },
    Bullet {
        id: EntityId,
        owner_id: Uuid,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
    },
    Enemy {
        id: EntityId,
        subtype: EnemyKind,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        hp: i32,
        max_hp: i32,
    },
    Item {
        id: EntityId,
        item_type: ItemKind,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}
