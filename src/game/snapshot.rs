//! Snapshot building

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ws::protocol::{EntitySnapshot, PlayerRef, ServerMsg};

use super::clock::MatchClock;
use super::entity::{Enemy, EntityStore, Item, Player, Projectile};
use super::MatchPhase;

impl From<&Player> for EntitySnapshot {
    fn from(p: &Player) -> Self {
        EntitySnapshot::Player {
            id: p.id,
            username: p.username.clone(),
            x: p.x,
            y: p.y,
            rotation: p.rotation,
            last_direction: p.last_direction,
            hp: p.hp,
            max_hp: p.max_hp,
            lives: p.lives,
            is_dead: p.is_dead,
            score: p.score,
            survival_time: p.survival_time_ms,
        }
    }
}

impl From<&Projectile> for EntitySnapshot {
    fn from(b: &Projectile) -> Self {
        EntitySnapshot::Bullet {
            id: b.id,
            owner_id: b.owner_id,
            x: b.x,
            y: b.y,
            vx: b.vel_x,
            vy: b.vel_y,
        }
    }
}

impl From<&Enemy> for EntitySnapshot {
    fn from(e: &Enemy) -> Self {
        EntitySnapshot::Enemy {
            id: e.id,
            subtype: e.kind,
            x: e.x,
            y: e.y,
            width: e.size,
            height: e.size,
            hp: e.hp,
            max_hp: e.max_hp,
        }
    }
}

impl From<&Item> for EntitySnapshot {
    fn from(i: &Item) -> Self {
        EntitySnapshot::Item {
            id: i.id,
            item_type: i.kind,
            x: i.x,
            y: i.y,
            width: i.size,
            height: i.size,
        }
    }
}

/// Builds full-state snapshots for network transmission.
///
/// Every tick gets a complete snapshot; there is no delta encoding.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Union of the four entity collections, keyed by wire id
    pub fn entities(store: &EntityStore) -> BTreeMap<String, EntitySnapshot> {
        let players = store
            .players
            .values()
            .map(|p| (p.id.to_string(), EntitySnapshot::from(p)));
        let projectiles = store
            .projectiles
            .values()
            .map(|b| (b.id.to_string(), EntitySnapshot::from(b)));
        let enemies = store
            .enemies
            .values()
            .map(|e| (e.id.to_string(), EntitySnapshot::from(e)));
        let items = store
            .items
            .values()
            .map(|i| (i.id.to_string(), EntitySnapshot::from(i)));

        players.chain(projectiles).chain(enemies).chain(items).collect()
    }

    pub fn scores(store: &EntityStore) -> BTreeMap<Uuid, u32> {
        store.players.values().map(|p| (p.id, p.score)).collect()
    }

    /// Build a `gameState` message
    pub fn build(
        phase: MatchPhase,
        store: &EntityStore,
        clock: &MatchClock,
        paused_by: Option<&PlayerRef>,
        now: u64,
    ) -> ServerMsg {
        let countdown = if phase == MatchPhase::Countdown {
            clock.countdown_secs(now)
        } else {
            0
        };

        ServerMsg::GameState {
            entities: Self::entities(store),
            timer: clock.timer_secs(now),
            countdown,
            scores: Self::scores(store),
            is_paused: clock.is_paused(),
            paused_by: paused_by.cloned(),
            match_state: phase,
        }
    }
}
