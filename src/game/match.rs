//! Match state and authoritative tick loop

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{unix_millis, TICK_DURATION_MICROS};
use crate::ws::protocol::{LeaderboardEntry, LobbyPlayer, PlayerRef, ServerMsg};
use crate::ws::registry::ConnectionRegistry;

use super::clock::MatchClock;
use super::combat::{CombatSystem, DamageOutcome};
use super::entity::{ConnId, EnemyKind, EntityId, EntityStore};
use super::physics::{distance, Body, Bounds, Edge, PhysicsSystem};
use super::rules::{min_players, ENEMY_SPAWN_INTERVAL_MS, PLAYER_SIZE};
use super::snapshot::SnapshotBuilder;
use super::SessionRequest;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    /// Lobby open, waiting for the lead player to start
    Waiting,
    /// Countdown before the match
    Countdown,
    /// Match in progress
    Playing,
    /// Match ended, results on screen
    GameOver,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPhase::Waiting => "WAITING",
            MatchPhase::Countdown => "COUNTDOWN",
            MatchPhase::Playing => "PLAYING",
            MatchPhase::GameOver => "GAME_OVER",
        };
        f.write_str(name)
    }
}

/// A message the match wants delivered
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Only to one connection
    To(ConnId, ServerMsg),
    /// To every connection
    All(ServerMsg),
}

/// Match state (owned by the match task)
pub struct MatchState {
    pub phase: MatchPhase,
    pub store: EntityStore,
    pub clock: MatchClock,
    /// May point at nobody once the lobby empties
    pub lead_player: Option<ConnId>,
    pub paused_by: Option<PlayerRef>,
    pub dev_mode: bool,
    /// Cleared at every countdown so each match opens with a spawn
    pub last_enemy_spawn: Option<u64>,
    last_tick: Option<u64>,
    pub(super) rng: ChaCha8Rng,
    outbox: Vec<Outbound>,
}

impl MatchState {
    pub fn new(seed: u64, dev_mode: bool) -> Self {
        Self {
            phase: MatchPhase::Waiting,
            store: EntityStore::new(),
            clock: MatchClock::new(),
            lead_player: None,
            paused_by: None,
            dev_mode,
            last_enemy_spawn: None,
            last_tick: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Vec::new(),
        }
    }

    pub fn min_players(&self) -> usize {
        min_players(self.dev_mode)
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// Take every message queued since the last call
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub(super) fn broadcast(&mut self, msg: ServerMsg) {
        self.outbox.push(Outbound::All(msg));
    }

    pub(super) fn send_to(&mut self, conn_id: ConnId, msg: ServerMsg) {
        self.outbox.push(Outbound::To(conn_id, msg));
    }

    pub fn lobby_state(&self) -> ServerMsg {
        let players = self
            .store
            .players_in_join_order()
            .into_iter()
            .map(|p| LobbyPlayer {
                id: p.id,
                username: p.username.clone(),
                is_lead_player: self.lead_player == Some(p.id),
            })
            .collect();

        ServerMsg::LobbyState {
            state: self.phase,
            players,
            dev_mode: self.dev_mode,
        }
    }

    pub(super) fn broadcast_lobby(&mut self) {
        let msg = self.lobby_state();
        self.broadcast(msg);
    }

    fn set_phase(&mut self, phase: MatchPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "Match state changed");
            self.phase = phase;
            self.broadcast_lobby();
        }
    }

    /// Random top-left position for a player inside the walls
    pub(super) fn random_player_position(&mut self) -> (f32, f32) {
        Bounds::for_size(PLAYER_SIZE).random_point(&mut self.rng)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// WAITING/GAME_OVER -> COUNTDOWN. Callers validate the request first.
    pub(super) fn begin_countdown(&mut self, now: u64) {
        self.set_phase(MatchPhase::Countdown);
        self.clock.start_countdown(now);
        self.paused_by = None;
        self.last_enemy_spawn = None;

        let bounds = Bounds::for_size(PLAYER_SIZE);
        for player in self.store.players.values_mut() {
            let (x, y) = bounds.random_point(&mut self.rng);
            player.reset_for_match(x, y);
        }
        self.store.clear_world();

        self.broadcast(ServerMsg::GameStarted {});
    }

    /// COUNTDOWN -> WAITING when the lobby shrinks below the minimum
    pub(super) fn abort_countdown(&mut self) {
        self.clock.reset();
        self.paused_by = None;
        self.set_phase(MatchPhase::Waiting);
    }

    /// COUNTDOWN -> PLAYING
    fn begin_match(&mut self, now: u64) {
        self.set_phase(MatchPhase::Playing);
        self.clock.start_match(now);
        info!(
            players = self.store.player_count(),
            game_end = ?self.clock.game_end(),
            "Match started"
        );
    }

    /// PLAYING -> GAME_OVER. Does nothing in any other phase.
    pub fn end_match(&mut self, now: u64) {
        if self.phase != MatchPhase::Playing {
            return;
        }

        if self.clock.is_paused() {
            self.clock.resume(now);
            self.paused_by = None;
        }

        let leaderboard = self.leaderboard();
        let winner = leaderboard.first().cloned();
        self.set_phase(MatchPhase::GameOver);

        info!(
            winner = winner.as_ref().map(|w| w.username.as_str()).unwrap_or("-"),
            players = leaderboard.len(),
            "Match ended"
        );
        self.broadcast(ServerMsg::GameEnded {
            winner,
            leaderboard,
        });
    }

    /// GAME_OVER -> WAITING once nobody is left
    pub(super) fn reopen_if_empty(&mut self) {
        if self.store.player_count() == 0 {
            self.lead_player = None;
            if self.phase == MatchPhase::GameOver {
                self.set_phase(MatchPhase::Waiting);
            }
        }
    }

    /// Close the current pause through the shared accounting path
    pub(super) fn apply_resume(&mut self, now: u64, resumed_by: PlayerRef) {
        let paused_for = self.clock.resume(now);
        self.paused_by = None;
        info!(
            resumed_by = %resumed_by.username,
            paused_ms = paused_for,
            "Match resumed"
        );
        self.broadcast(ServerMsg::GameResumed { resumed_by });
    }

    /// Standings: score descending, then survival time descending
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut players = self.store.players_in_join_order();
        players.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.survival_time_ms.cmp(&a.survival_time_ms))
        });

        players
            .into_iter()
            .map(|p| LeaderboardEntry {
                id: p.id,
                username: p.username.clone(),
                score: p.score,
                survival_time: p.survival_time_ms / 1000,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    /// Run a single simulation tick at wall-clock time `now`
    pub fn tick(&mut self, now: u64) {
        let delta = self.last_tick.map_or(0, |last| now.saturating_sub(last));
        self.last_tick = Some(now);

        let paused = self.clock.is_paused();

        if self.phase == MatchPhase::Playing && !paused {
            for player in self.store.players.values_mut().filter(|p| !p.is_dead) {
                player.survival_time_ms += delta;
            }
        }

        if self.phase == MatchPhase::Countdown {
            // Input is accepted during the countdown but never acted on
            for player in self.store.players.values_mut() {
                player.keys.clear();
            }
            if !paused && self.clock.countdown_finished(now) {
                self.begin_match(now);
            }
            self.broadcast_snapshot(now);
            return;
        }

        if self.phase != MatchPhase::Playing || paused {
            self.broadcast_snapshot(now);
            return;
        }

        if self.clock.time_up(now) {
            self.end_match(now);
            return;
        }

        self.run_spawner(now);
        self.update_players(now);
        self.update_projectiles();
        self.update_enemies(now);
        if self.phase == MatchPhase::Playing {
            self.update_items();
        }

        self.broadcast_snapshot(now);
    }

    fn broadcast_snapshot(&mut self, now: u64) {
        let snapshot = SnapshotBuilder::build(
            self.phase,
            &self.store,
            &self.clock,
            self.paused_by.as_ref(),
            now,
        );
        self.broadcast(snapshot);
    }

    fn run_spawner(&mut self, now: u64) {
        let due = self
            .last_enemy_spawn
            .map_or(true, |last| now.saturating_sub(last) > ENEMY_SPAWN_INTERVAL_MS);
        if due {
            self.spawn_enemy();
            self.last_enemy_spawn = Some(now);
        }
    }

    /// Spawn one random enemy on a random map edge
    pub fn spawn_enemy(&mut self) -> EntityId {
        let edge = Edge::ALL[self.rng.gen_range(0..Edge::ALL.len())];
        let kind = EnemyKind::ALL[self.rng.gen_range(0..EnemyKind::ALL.len())];
        let size = super::entity::EnemyStats::for_kind(kind).size;
        let (x, y) = PhysicsSystem::edge_spawn_point(edge, size, &mut self.rng);
        let id = self.store.spawn_enemy(kind, x, y);
        debug!(enemy = %id, ?kind, ?edge, "Enemy spawned");
        id
    }

    /// Move living players and fire on a rising fire edge
    fn update_players(&mut self, now: u64) {
        let mut shots = Vec::new();

        for player in self.store.players.values_mut() {
            if player.is_dead {
                continue;
            }

            PhysicsSystem::move_player(player);

            if CombatSystem::try_fire(player, now) {
                let (x, y) = player.center();
                let (vel_x, vel_y) = CombatSystem::bullet_velocity(player.last_direction);
                shots.push((player.id, x, y, vel_x, vel_y));
            }
        }

        for (owner, x, y, vel_x, vel_y) in shots {
            self.store.spawn_projectile(owner, x, y, vel_x, vel_y);
        }
    }

    /// Advance projectiles and resolve hits against enemies
    fn update_projectiles(&mut self) {
        let ids: Vec<EntityId> = self.store.projectiles.keys().copied().collect();

        for id in ids {
            let Some(projectile) = self.store.projectiles.get_mut(&id) else {
                continue;
            };
            if !CombatSystem::update_projectile(projectile) {
                self.store.projectiles.remove(&id);
                continue;
            }

            let bullet = projectile.hitbox();
            let owner = projectile.owner_id;

            let hit = self
                .store
                .enemies
                .values()
                .find(|enemy| bullet.overlaps(&enemy.hitbox()))
                .map(|enemy| enemy.id);

            if let Some(enemy_id) = hit {
                // The bullet is spent whether or not the enemy dies
                self.store.projectiles.remove(&id);
                self.damage_enemy(enemy_id, owner);
            }
        }
    }

    fn damage_enemy(&mut self, enemy_id: EntityId, owner: ConnId) {
        let Some(enemy) = self.store.enemies.get_mut(&enemy_id) else {
            return;
        };
        enemy.hp -= 1;
        if enemy.hp > 0 {
            return;
        }

        let (x, y) = (enemy.x, enemy.y);
        self.store.enemies.remove(&enemy_id);

        match self.store.player_mut(&owner) {
            Some(shooter) => shooter.score += 1,
            None => debug!(enemy = %enemy_id, owner = %owner, "Kill credited to departed player"),
        }

        if let Some(kind) = CombatSystem::roll_drop(&mut self.rng) {
            let item = self.store.spawn_item(kind, x, y);
            debug!(item = %item, ?kind, "Item dropped");
        }
    }

    /// Enemies hurt touching players, then chase the nearest living one
    fn update_enemies(&mut self, now: u64) {
        let centers: Vec<(EntityId, (f32, f32))> = self
            .store
            .enemies
            .values()
            .map(|e| (e.id, e.center()))
            .collect();

        for &(id, center) in &centers {
            let Some(enemy) = self.store.enemies.get(&id) else {
                continue;
            };

            let mut target: Option<(f32, (f32, f32))> = None;
            let mut touching = Vec::new();
            for player in self.store.players.values().filter(|p| !p.is_dead) {
                let player_center = player.center();
                let dist = distance(center, player_center);
                if target.map_or(true, |(best, _)| dist < best) {
                    target = Some((dist, player_center));
                }
                if PhysicsSystem::check_collision(enemy, player) {
                    touching.push(player.id);
                }
            }

            for victim in touching {
                self.hurt_player(victim, now);
            }
            if self.phase != MatchPhase::Playing {
                return;
            }

            if let Some((_, target)) = target {
                let (dx, dy) = PhysicsSystem::steer_enemy(id, center, target, &centers);
                if let Some(enemy) = self.store.enemies.get_mut(&id) {
                    enemy.x += dx;
                    enemy.y += dy;
                }
            }
        }
    }

    fn hurt_player(&mut self, victim: ConnId, now: u64) {
        let Some(player) = self.store.player_mut(&victim) else {
            return;
        };

        match CombatSystem::apply_contact_damage(player, now) {
            DamageOutcome::Ignored | DamageOutcome::Hurt => {}
            DamageOutcome::LifeLost => {
                let lives = player.lives;
                let (x, y) = Bounds::for_size(PLAYER_SIZE).random_point(&mut self.rng);
                if let Some(player) = self.store.player_mut(&victim) {
                    player.x = x;
                    player.y = y;
                }
                debug!(player = %victim, lives, "Player lost a life");
            }
            DamageOutcome::Eliminated => {
                info!(player = %victim, "Player eliminated");
                if self.store.all_dead() {
                    self.end_match(now);
                }
            }
        }
    }

    /// Living players pick up items that help them
    fn update_items(&mut self) {
        let ids: Vec<EntityId> = self.store.items.keys().copied().collect();

        for id in ids {
            let Some(item) = self.store.items.get(&id) else {
                continue;
            };
            let hitbox = item.hitbox();
            let kind = item.kind;

            let picked_up = self
                .store
                .players
                .values_mut()
                .filter(|p| !p.is_dead)
                .any(|p| hitbox.overlaps(&p.hitbox()) && CombatSystem::try_pickup(p, kind));

            if picked_up {
                self.store.items.remove(&id);
            }
        }
    }
}

/// Handle to the running match
#[derive(Clone)]
pub struct MatchHandle {
    pub request_tx: mpsc::Sender<SessionRequest>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    request_rx: mpsc::Receiver<SessionRequest>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    connections: Arc<ConnectionRegistry>,
    player_count: Arc<AtomicUsize>,
}

impl GameMatch {
    /// Create the match and the handle connections use to reach it
    pub fn new(seed: u64, dev_mode: bool, connections: Arc<ConnectionRegistry>) -> (Self, MatchHandle) {
        let (request_tx, request_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = MatchHandle {
            request_tx,
            snapshot_tx: snapshot_tx.clone(),
            player_count: player_count.clone(),
        };

        let game_match = Self {
            state: MatchState::new(seed, dev_mode),
            request_rx,
            snapshot_tx,
            connections,
            player_count,
        };

        (game_match, handle)
    }

    /// Run the authoritative tick loop until every request sender is gone
    pub async fn run(mut self) {
        info!(dev_mode = self.state.dev_mode, "Match loop started");
        if self.state.dev_mode {
            info!("Dev mode enabled: single player matches allowed");
        }

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let now = unix_millis();

            // Drain request queue
            if !self.process_requests(now) {
                info!("Request channel closed, stopping match loop");
                break;
            }

            self.state.tick(now);
            self.flush();
        }
    }

    /// Apply all pending requests, returns false once the channel is closed
    fn process_requests(&mut self, now: u64) -> bool {
        loop {
            match self.request_rx.try_recv() {
                Ok(request) => self.state.handle_request(request, now),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
        self.player_count
            .store(self.state.store.player_count(), Ordering::Relaxed);
        true
    }

    /// Deliver queued messages
    fn flush(&mut self) {
        for outbound in self.state.drain_outbound() {
            match outbound {
                Outbound::All(msg @ ServerMsg::GameState { .. }) => {
                    // No receivers just means nobody is connected
                    let _ = self.snapshot_tx.send(msg);
                }
                Outbound::All(msg) => {
                    // Events must not be lost to broadcast lag
                    self.connections.send_all(msg);
                }
                Outbound::To(conn_id, msg) => {
                    self.connections.send(&conn_id, msg);
                }
            }
        }
    }
}
