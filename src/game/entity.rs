//! Entity records and the id-keyed store the match owns

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::physics::{Body, Circle};
use super::rules::{BULLET_SIZE, ENEMY_SIZE, ITEM_SIZE, MAX_LIVES, PLAYER_MAX_HP, PLAYER_SIZE};

/// Connection id. Doubles as the player id once the connection has joined.
pub type ConnId = Uuid;

/// Id of a non-player entity. Allocated from a monotonic counter, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e_{}", self.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Enemy variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnemyKind {
    Skeleton1,
    Skeleton2,
    Vampire,
}

impl EnemyKind {
    pub const ALL: [EnemyKind; 3] = [EnemyKind::Skeleton1, EnemyKind::Skeleton2, EnemyKind::Vampire];
}

/// Size and toughness per enemy variant
#[derive(Debug, Clone, Copy)]
pub struct EnemyStats {
    pub size: f32,
    pub hp: i32,
}

impl EnemyStats {
    pub fn for_kind(kind: EnemyKind) -> Self {
        match kind {
            EnemyKind::Skeleton1 => Self { size: ENEMY_SIZE, hp: 1 },
            EnemyKind::Skeleton2 => Self { size: ENEMY_SIZE, hp: 2 },
            EnemyKind::Vampire => Self { size: 64.0, hp: 5 },
        }
    }
}

/// Pickup variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    HpFlask,
    Heart,
}

/// Player state (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: ConnId,
    pub username: String,
    /// Order of arrival in the lobby
    pub join_seq: u64,

    // Position is the top-left corner of the sprite box
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    /// Aim direction in radians, updated only while moving
    pub last_direction: f32,

    // Input tracking
    pub keys: HashMap<String, bool>,
    pub fire_held: bool,
    pub last_fired: Option<u64>,

    // Combat
    pub hp: i32,
    pub max_hp: i32,
    pub lives: u32,
    pub is_dead: bool,
    pub last_damage: Option<u64>,

    // Stats
    pub score: u32,
    pub survival_time_ms: u64,
}

impl Player {
    pub fn new(id: ConnId, username: String, join_seq: u64, x: f32, y: f32) -> Self {
        Self {
            id,
            username,
            join_seq,
            x,
            y,
            rotation: 0.0,
            last_direction: 0.0,
            keys: HashMap::new(),
            fire_held: false,
            last_fired: None,
            hp: PLAYER_MAX_HP,
            max_hp: PLAYER_MAX_HP,
            lives: MAX_LIVES,
            is_dead: false,
            last_damage: None,
            score: 0,
            survival_time_ms: 0,
        }
    }

    /// Put the player back into fresh-match condition at `(x, y)`
    pub fn reset_for_match(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.score = 0;
        self.hp = self.max_hp;
        self.lives = MAX_LIVES;
        self.is_dead = false;
        self.survival_time_ms = 0;
        self.fire_held = false;
        self.keys.clear();
        self.last_fired = None;
        self.last_damage = None;
    }

    pub fn is_pressed(&self, code: &str) -> bool {
        self.keys.get(code).copied().unwrap_or(false)
    }

    pub fn any_pressed(&self, codes: &[&str]) -> bool {
        codes.iter().any(|code| self.is_pressed(code))
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + PLAYER_SIZE / 2.0, self.y + PLAYER_SIZE / 2.0)
    }
}

impl Body for Player {
    fn hitbox(&self) -> Circle {
        let (x, y) = self.center();
        Circle::from_size(x, y, PLAYER_SIZE)
    }
}

/// Active projectile. Position is the bullet center.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    /// May dangle once the shooter leaves
    pub owner_id: ConnId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub start_x: f32,
    pub start_y: f32,
}

impl Body for Projectile {
    fn hitbox(&self) -> Circle {
        Circle::from_size(self.x, self.y, BULLET_SIZE)
    }
}

/// Enemy state. Position is the top-left corner.
#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub hp: i32,
    pub max_hp: i32,
}

impl Enemy {
    pub fn new(id: EntityId, kind: EnemyKind, x: f32, y: f32) -> Self {
        let stats = EnemyStats::for_kind(kind);
        Self {
            id,
            kind,
            x,
            y,
            size: stats.size,
            hp: stats.hp,
            max_hp: stats.hp,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.size / 2.0, self.y + self.size / 2.0)
    }
}

impl Body for Enemy {
    fn hitbox(&self) -> Circle {
        let (x, y) = self.center();
        Circle::from_size(x, y, self.size)
    }
}

/// Dropped pickup. Position is the top-left corner.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: EntityId,
    pub kind: ItemKind,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Body for Item {
    fn hitbox(&self) -> Circle {
        Circle::from_size(self.x + self.size / 2.0, self.y + self.size / 2.0, self.size)
    }
}

/// The four entity collections plus the id allocator
#[derive(Debug, Default)]
pub struct EntityStore {
    pub players: HashMap<ConnId, Player>,
    pub projectiles: BTreeMap<EntityId, Projectile>,
    pub enemies: BTreeMap<EntityId, Enemy>,
    pub items: BTreeMap<EntityId, Item>,
    next_id: u64,
    next_join_seq: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh entity id
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_player(&mut self, id: ConnId, username: String, x: f32, y: f32) -> &Player {
        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id, username, seq, x, y))
    }

    pub fn remove_player(&mut self, id: &ConnId) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn player(&self, id: &ConnId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &ConnId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Players in join order
    pub fn players_in_join_order(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.join_seq);
        players
    }

    /// Earliest-joined player, if any
    pub fn first_joined(&self) -> Option<ConnId> {
        self.players.values().min_by_key(|p| p.join_seq).map(|p| p.id)
    }

    /// Case-insensitive username lookup
    pub fn username_taken(&self, username: &str) -> bool {
        let wanted = username.to_lowercase();
        self.players
            .values()
            .any(|p| p.username.to_lowercase() == wanted)
    }

    pub fn all_dead(&self) -> bool {
        self.players.values().all(|p| p.is_dead)
    }

    pub fn spawn_projectile(&mut self, owner_id: ConnId, x: f32, y: f32, vel_x: f32, vel_y: f32) -> EntityId {
        let id = self.allocate_id();
        self.projectiles.insert(
            id,
            Projectile {
                id,
                owner_id,
                x,
                y,
                vel_x,
                vel_y,
                start_x: x,
                start_y: y,
            },
        );
        id
    }

    pub fn spawn_enemy(&mut self, kind: EnemyKind, x: f32, y: f32) -> EntityId {
        let id = self.allocate_id();
        self.enemies.insert(id, Enemy::new(id, kind, x, y));
        id
    }

    pub fn spawn_item(&mut self, kind: ItemKind, x: f32, y: f32) -> EntityId {
        let id = self.allocate_id();
        self.items.insert(
            id,
            Item {
                id,
                kind,
                x,
                y,
                size: ITEM_SIZE,
            },
        );
        id
    }

    /// Drop every non-player entity
    pub fn clear_world(&mut self) {
        self.projectiles.clear();
        self.enemies.clear();
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_monotonic_and_never_reused() {
        let mut store = EntityStore::new();
        let a = store.spawn_enemy(EnemyKind::Skeleton1, 100.0, 100.0);
        let b = store.spawn_item(ItemKind::Heart, 100.0, 100.0);
        store.clear_world();
        let c = store.spawn_projectile(Uuid::new_v4(), 0.0, 0.0, 1.0, 0.0);

        assert!(a < b && b < c);
        assert_eq!(c.to_string(), "e_2");
    }

    #[test]
    fn test_enemy_stats_table() {
        let vampire = Enemy::new(EntityId(0), EnemyKind::Vampire, 0.0, 0.0);
        assert_eq!((vampire.size, vampire.hp, vampire.max_hp), (64.0, 5, 5));
        assert_eq!(EnemyStats::for_kind(EnemyKind::Skeleton2).hp, 2);
        assert_eq!(EnemyStats::for_kind(EnemyKind::Skeleton1).size, ENEMY_SIZE);
    }

    #[test]
    fn test_username_lookup_ignores_case() {
        let mut store = EntityStore::new();
        store.add_player(Uuid::new_v4(), "Ann".to_string(), 50.0, 50.0);
        assert!(store.username_taken("ann"));
        assert!(store.username_taken("ANN"));
        assert!(!store.username_taken("bob"));
    }

    #[test]
    fn test_first_joined_follows_join_order() {
        let mut store = EntityStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.add_player(first, "first".to_string(), 50.0, 50.0);
        store.add_player(second, "second".to_string(), 50.0, 50.0);

        assert_eq!(store.first_joined(), Some(first));
        store.remove_player(&first);
        assert_eq!(store.first_joined(), Some(second));
    }

    #[test]
    fn test_reset_for_match() {
        let mut player = Player::new(Uuid::new_v4(), "ann".to_string(), 0, 0.0, 0.0);
        player.hp = 0;
        player.lives = 0;
        player.is_dead = true;
        player.score = 7;
        player.survival_time_ms = 9_000;
        player.fire_held = true;
        player.keys.insert("Space".to_string(), true);

        player.reset_for_match(200.0, 300.0);

        assert_eq!((player.x, player.y), (200.0, 300.0));
        assert_eq!(player.hp, player.max_hp);
        assert_eq!(player.lives, MAX_LIVES);
        assert!(!player.is_dead);
        assert_eq!(player.score, 0);
        assert_eq!(player.survival_time_ms, 0);
        assert!(!player.fire_held);
        assert!(!player.is_pressed("Space"));
    }
}
