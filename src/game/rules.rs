//! Fixed game configuration. None of this is negotiable at runtime.

// Map
pub const MAP_WIDTH: f32 = 1280.0;
pub const MAP_HEIGHT: f32 = 960.0;
pub const WALL_SIDE_WIDTH: f32 = 32.0;
pub const WALL_TOP_BOT_HEIGHT: f32 = 32.0;

// Player
pub const PLAYER_SIZE: f32 = 32.0;
pub const PLAYER_SPEED: f32 = 240.0; // px/s
pub const PLAYER_MAX_HP: i32 = 100;
pub const MAX_LIVES: u32 = 3;

// Bullets
pub const BULLET_SIZE: f32 = 8.0;
pub const BULLET_SPEED: f32 = 600.0; // px/s
pub const BULLET_RANGE: f32 = 500.0;
pub const FIRE_COOLDOWN_MS: u64 = 250;

// Enemies
pub const ENEMY_SIZE: f32 = 48.0;
pub const ENEMY_SPEED: f32 = 90.0; // px/s
pub const ENEMY_SPAWN_INTERVAL_MS: u64 = 2_000;
pub const ENEMY_CONTACT_DAMAGE: i32 = 10;
pub const ENEMY_DAMAGE_COOLDOWN_MS: u64 = 1_000;
pub const SEPARATION_RADIUS: f32 = ENEMY_SIZE * 1.5;
pub const SEPARATION_WEIGHT: f32 = 0.6;

// Items
pub const ITEM_SIZE: f32 = 24.0;
pub const HEART_DROP_RATE: f64 = 0.05;
pub const FLASK_DROP_RATE: f64 = 0.20;

// Lobby
pub const MIN_PLAYERS: usize = 2;
pub const DEV_MIN_PLAYERS: usize = 1;
pub const MAX_PLAYERS: usize = 4;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

// Match timing
pub const MATCH_DURATION_MS: u64 = 120_000;
pub const COUNTDOWN_DURATION_MS: u64 = 3_000;

/// Movement keys, matched against the client's `KeyboardEvent.code` values
pub const KEYS_UP: [&str; 2] = ["ArrowUp", "KeyW"];
pub const KEYS_DOWN: [&str; 2] = ["ArrowDown", "KeyS"];
pub const KEYS_LEFT: [&str; 2] = ["ArrowLeft", "KeyA"];
pub const KEYS_RIGHT: [&str; 2] = ["ArrowRight", "KeyD"];
pub const KEY_FIRE: &str = "Space";

/// Minimum players needed to start or keep a match running
pub fn min_players(dev_mode: bool) -> usize {
    if dev_mode {
        DEV_MIN_PLAYERS
    } else {
        MIN_PLAYERS
    }
}
