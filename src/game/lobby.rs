//! Lobby and match-control requests: join, start, pause, resume, quit, leave

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientMsg, PlayerRef, ServerMsg};

use super::entity::ConnId;
use super::r#match::{MatchPhase, MatchState};
use super::rules::{MAX_PLAYERS, USERNAME_MAX_LEN, USERNAME_MIN_LEN};
use super::{SessionEvent, SessionRequest};

/// Why a lobby request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("Name must be between 3 and 20 characters.")]
    InvalidName,

    #[error("Name is already taken! Please choose another name.")]
    NameTaken,

    #[error("Game is currently in progress. Please wait for the game to end.")]
    GameInProgress,

    #[error("Game is full! (Max 4 players)")]
    GameFull,

    #[error("You have already joined the game")]
    AlreadyJoined,

    #[error("Only the lead player can start the game")]
    NotLeadPlayer,

    #[error("Need {min}-{max} players to start the game{}", dev_mode_note(.dev_mode))]
    InvalidPlayerCount {
        min: usize,
        max: usize,
        dev_mode: bool,
    },

    #[error("Game is not ready to start")]
    GameNotReady,

    #[error("Player not found")]
    PlayerNotFound,

    #[error("Game is not currently playing")]
    GameNotPlaying,

    #[error("Game is already paused")]
    AlreadyPaused,

    #[error("Game is not paused")]
    GameNotPaused,
}

fn dev_mode_note(dev_mode: &bool) -> &'static str {
    if *dev_mode {
        " (DEV MODE: 1 minimum)"
    } else {
        ""
    }
}

impl LobbyError {
    /// Wire code sent to the client
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::InvalidName => "INVALID_NAME",
            LobbyError::NameTaken => "NAME_TAKEN",
            LobbyError::GameInProgress => "GAME_IN_PROGRESS",
            LobbyError::GameFull => "GAME_FULL",
            LobbyError::AlreadyJoined => "ALREADY_JOINED",
            LobbyError::NotLeadPlayer => "NOT_LEAD_PLAYER",
            LobbyError::InvalidPlayerCount { .. } => "INVALID_PLAYER_COUNT",
            LobbyError::GameNotReady => "GAME_NOT_READY",
            LobbyError::PlayerNotFound => "PLAYER_NOT_FOUND",
            LobbyError::GameNotPlaying => "GAME_NOT_PLAYING",
            LobbyError::AlreadyPaused => "ALREADY_PAUSED",
            LobbyError::GameNotPaused => "GAME_NOT_PAUSED",
        }
    }

    /// `joinError` reply for a rejected join
    pub fn join_error(&self) -> ServerMsg {
        ServerMsg::JoinError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }

    /// `error` reply for any other rejected request
    pub fn error(&self) -> ServerMsg {
        ServerMsg::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl MatchState {
    /// Apply one request from a session
    pub fn handle_request(&mut self, request: SessionRequest, now: u64) {
        let conn_id = request.conn_id;
        match request.event {
            SessionEvent::Connected => {
                let lobby = self.lobby_state();
                self.send_to(conn_id, lobby);
            }
            SessionEvent::Message(msg) => self.handle_client_msg(conn_id, msg, now),
            SessionEvent::Disconnected => {
                if let Some(player) = self.remove_player(conn_id, now) {
                    info!(player = %conn_id, username = %player, "Player disconnected");
                }
            }
        }
    }

    fn handle_client_msg(&mut self, conn_id: ConnId, msg: ClientMsg, now: u64) {
        let result = match msg {
            ClientMsg::Join { username } => {
                if let Err(e) = self.join(conn_id, &username, now) {
                    debug!(conn_id = %conn_id, code = e.code(), "Join rejected");
                    self.send_to(conn_id, e.join_error());
                }
                return;
            }
            ClientMsg::Input { keys } => {
                self.handle_input(conn_id, keys);
                return;
            }
            ClientMsg::StartGame => self.start_game(conn_id, now),
            ClientMsg::PauseGame => self.pause(conn_id, now),
            ClientMsg::ResumeGame => self.resume(conn_id, now),
            ClientMsg::QuitGame => self.quit(conn_id, now),
        };

        if let Err(e) = result {
            debug!(conn_id = %conn_id, code = e.code(), "Request rejected");
            self.send_to(conn_id, e.error());
        }
    }

    /// Add a connection to the lobby as a named player
    pub fn join(&mut self, conn_id: ConnId, username: &str, now: u64) -> Result<(), LobbyError> {
        if self.store.player(&conn_id).is_some() {
            return Err(LobbyError::AlreadyJoined);
        }

        let username = username.trim();
        let len = username.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
            return Err(LobbyError::InvalidName);
        }
        if self.store.username_taken(username) {
            return Err(LobbyError::NameTaken);
        }
        if self.phase == MatchPhase::Playing {
            return Err(LobbyError::GameInProgress);
        }
        if self.store.player_count() >= MAX_PLAYERS {
            return Err(LobbyError::GameFull);
        }

        if self.lead_player.is_none() {
            self.lead_player = Some(conn_id);
        }
        let is_lead_player = self.lead_player == Some(conn_id);

        let (x, y) = self.random_player_position();
        self.store.add_player(conn_id, username.to_string(), x, y);

        info!(
            player = %conn_id,
            username,
            lead = is_lead_player,
            players = self.store.player_count(),
            at = now,
            "Player joined"
        );

        self.send_to(
            conn_id,
            ServerMsg::Joined {
                id: conn_id,
                username: username.to_string(),
                is_lead_player,
            },
        );
        self.broadcast(ServerMsg::PlayerJoined {
            id: conn_id,
            username: username.to_string(),
        });
        self.broadcast_lobby();

        Ok(())
    }

    /// Replace a player's held-key state. Unknown connections are ignored.
    pub fn handle_input(&mut self, conn_id: ConnId, keys: HashMap<String, bool>) {
        if let Some(player) = self.store.player_mut(&conn_id) {
            player.keys = keys;
        }
    }

    /// Lead player starts the countdown
    pub fn start_game(&mut self, conn_id: ConnId, now: u64) -> Result<(), LobbyError> {
        if self.lead_player != Some(conn_id) || self.store.player(&conn_id).is_none() {
            return Err(LobbyError::NotLeadPlayer);
        }

        let count = self.store.player_count();
        let min = self.min_players();
        if count < min || count > MAX_PLAYERS {
            return Err(LobbyError::InvalidPlayerCount {
                min,
                max: MAX_PLAYERS,
                dev_mode: self.dev_mode,
            });
        }

        if !matches!(self.phase, MatchPhase::Waiting | MatchPhase::GameOver) {
            return Err(LobbyError::GameNotReady);
        }

        info!(players = count, "Countdown started");
        self.begin_countdown(now);
        Ok(())
    }

    /// Freeze the match on behalf of a player
    pub fn pause(&mut self, conn_id: ConnId, now: u64) -> Result<(), LobbyError> {
        let player = self
            .store
            .player(&conn_id)
            .ok_or(LobbyError::PlayerNotFound)?;
        let paused_by = PlayerRef::player(conn_id, &player.username);

        if !matches!(self.phase, MatchPhase::Countdown | MatchPhase::Playing) {
            return Err(LobbyError::GameNotPlaying);
        }
        if self.clock.is_paused() {
            return Err(LobbyError::AlreadyPaused);
        }

        self.clock.pause(now);
        self.paused_by = Some(paused_by.clone());
        info!(paused_by = %paused_by.username, phase = %self.phase, "Match paused");
        self.broadcast(ServerMsg::GamePaused { paused_by });
        Ok(())
    }

    /// Unfreeze the match. Any joined player may resume.
    pub fn resume(&mut self, conn_id: ConnId, now: u64) -> Result<(), LobbyError> {
        let player = self
            .store
            .player(&conn_id)
            .ok_or(LobbyError::PlayerNotFound)?;
        let resumed_by = PlayerRef::player(conn_id, &player.username);

        if !self.clock.is_paused() {
            return Err(LobbyError::GameNotPaused);
        }

        self.apply_resume(now, resumed_by);
        Ok(())
    }

    /// Player leaves the match on purpose
    pub fn quit(&mut self, conn_id: ConnId, now: u64) -> Result<(), LobbyError> {
        let player = self
            .store
            .player(&conn_id)
            .ok_or(LobbyError::PlayerNotFound)?;
        let quit_by = PlayerRef::player(conn_id, &player.username);

        self.remove_player(conn_id, now);
        info!(player = %conn_id, username = %quit_by.username, "Player quit");
        self.broadcast(ServerMsg::PlayerQuit { quit_by });
        Ok(())
    }

    /// Drop a player and repair everything that pointed at them.
    /// Returns the username of the removed player.
    pub fn remove_player(&mut self, conn_id: ConnId, now: u64) -> Option<String> {
        let player = self.store.remove_player(&conn_id)?;

        let was_pauser = self
            .paused_by
            .as_ref()
            .is_some_and(|p| p.id == conn_id.to_string());
        if self.clock.is_paused() && was_pauser {
            self.apply_resume(now, PlayerRef::system());
        }

        if self.lead_player == Some(conn_id) {
            self.lead_player = self.store.first_joined();
            if let Some(lead) = self.lead_player {
                info!(lead = %lead, "Lead player reassigned");
            }
        }

        let count = self.store.player_count();
        let below_min = count < self.min_players();
        match self.phase {
            MatchPhase::Countdown if below_min => {
                warn!(players = count, "Not enough players, countdown cancelled");
                self.abort_countdown();
            }
            MatchPhase::Playing if below_min => {
                warn!(players = count, "Not enough players, ending match");
                self.end_match(now);
            }
            MatchPhase::Playing if self.store.all_dead() => self.end_match(now),
            _ => {}
        }
        self.reopen_if_empty();

        self.broadcast(ServerMsg::PlayerLeft {
            id: conn_id,
            username: player.username.clone(),
        });
        self.broadcast_lobby();

        Some(player.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::Outbound;
    use crate::game::rules::COUNTDOWN_DURATION_MS;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    const T0: u64 = 5_000_000;

    fn lobby() -> MatchState {
        MatchState::new(21, false)
    }

    fn joined(state: &mut MatchState, name: &str) -> ConnId {
        let id = Uuid::new_v4();
        assert_ok!(state.join(id, name, T0));
        id
    }

    fn started(state: &mut MatchState, lead: ConnId) {
        assert_ok!(state.start_game(lead, T0));
        state.tick(T0);
        state.tick(T0 + COUNTDOWN_DURATION_MS);
        assert_eq!(state.phase, MatchPhase::Playing);
    }

    #[test]
    fn test_join_validates_name() {
        let mut state = lobby();
        assert_eq!(state.join(Uuid::new_v4(), "ab", T0), Err(LobbyError::InvalidName));
        assert_eq!(
            state.join(Uuid::new_v4(), &"x".repeat(21), T0),
            Err(LobbyError::InvalidName)
        );
        assert_eq!(state.join(Uuid::new_v4(), "   ", T0), Err(LobbyError::InvalidName));

        joined(&mut state, "ann");
        let err = assert_err!(state.join(Uuid::new_v4(), "Ann", T0));
        assert_eq!(err, LobbyError::NameTaken);
        assert_eq!(err.code(), "NAME_TAKEN");
        assert_eq!(state.store.player_count(), 1);
    }

    #[test]
    fn test_join_trims_and_replies() {
        let mut state = lobby();
        let id = Uuid::new_v4();
        assert_ok!(state.join(id, "  bob  ", T0));
        assert_eq!(state.store.player(&id).unwrap().username, "bob");

        let outbound = state.drain_outbound();
        assert!(matches!(
            &outbound[0],
            Outbound::To(to, ServerMsg::Joined { is_lead_player: true, username, .. })
                if *to == id && username == "bob"
        ));
        assert!(outbound
            .iter()
            .any(|o| matches!(o, Outbound::All(ServerMsg::PlayerJoined { .. }))));
        assert!(outbound
            .iter()
            .any(|o| matches!(o, Outbound::All(ServerMsg::LobbyState { .. }))));
    }

    #[test]
    fn test_join_rejects_full_lobby_and_repeat_join() {
        let mut state = lobby();
        let first = joined(&mut state, "p-one");
        for name in ["p-two", "p-three", "p-four"] {
            joined(&mut state, name);
        }
        assert_eq!(state.join(Uuid::new_v4(), "p-five", T0), Err(LobbyError::GameFull));
        assert_eq!(state.join(first, "again", T0), Err(LobbyError::AlreadyJoined));
    }

    #[test]
    fn test_join_rejected_while_playing() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        joined(&mut state, "bravo");
        started(&mut state, a);

        assert_eq!(
            state.join(Uuid::new_v4(), "charlie", T0 + 10_000),
            Err(LobbyError::GameInProgress)
        );
    }

    #[test]
    fn test_only_lead_starts_with_enough_players() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        assert_eq!(
            state.start_game(a, T0),
            Err(LobbyError::InvalidPlayerCount {
                min: 2,
                max: 4,
                dev_mode: false
            })
        );

        let b = joined(&mut state, "bravo");
        assert_eq!(state.start_game(b, T0), Err(LobbyError::NotLeadPlayer));
        assert_eq!(state.start_game(Uuid::new_v4(), T0), Err(LobbyError::NotLeadPlayer));

        assert_ok!(state.start_game(a, T0));
        assert_eq!(state.phase, MatchPhase::Countdown);
        assert_eq!(state.start_game(a, T0 + 10), Err(LobbyError::GameNotReady));
    }

    #[test]
    fn test_dev_mode_allows_solo_start() {
        let mut state = MatchState::new(21, true);
        let solo = joined(&mut state, "solo");
        assert_ok!(state.start_game(solo, T0));
        assert_eq!(state.phase, MatchPhase::Countdown);

        match state.lobby_state() {
            ServerMsg::LobbyState { dev_mode, .. } => assert!(dev_mode),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_player_count_message() {
        let err = LobbyError::InvalidPlayerCount {
            min: 2,
            max: 4,
            dev_mode: false,
        };
        assert_eq!(err.to_string(), "Need 2-4 players to start the game");

        let dev = LobbyError::InvalidPlayerCount {
            min: 1,
            max: 4,
            dev_mode: true,
        };
        assert_eq!(
            dev.to_string(),
            "Need 1-4 players to start the game (DEV MODE: 1 minimum)"
        );
        assert_eq!(
            LobbyError::GameInProgress.to_string(),
            "Game is currently in progress. Please wait for the game to end."
        );
        assert_eq!(
            LobbyError::GameFull.to_string(),
            "Game is full! (Max 4 players)"
        );
    }

    #[test]
    fn test_restart_from_game_over_resets_players() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");
        started(&mut state, a);

        state.store.player_mut(&b).unwrap().score = 9;
        state.store.spawn_enemy(crate::game::entity::EnemyKind::Vampire, 600.0, 600.0);
        state.end_match(T0 + 20_000);
        assert_eq!(state.phase, MatchPhase::GameOver);

        assert_ok!(state.start_game(a, T0 + 30_000));
        assert_eq!(state.phase, MatchPhase::Countdown);
        assert_eq!(state.store.player(&b).unwrap().score, 0);
        assert!(state.store.enemies.is_empty());
    }

    #[test]
    fn test_pause_rules() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");

        assert_eq!(state.pause(a, T0), Err(LobbyError::GameNotPlaying));
        assert_eq!(state.pause(Uuid::new_v4(), T0), Err(LobbyError::PlayerNotFound));
        assert_eq!(state.resume(a, T0), Err(LobbyError::GameNotPaused));

        started(&mut state, a);
        assert_ok!(state.pause(b, T0 + 4_000));
        assert_eq!(state.pause(a, T0 + 4_100), Err(LobbyError::AlreadyPaused));
        assert_eq!(state.paused_by.as_ref().unwrap().username, "bravo");

        // Anyone may resume
        assert_ok!(state.resume(a, T0 + 5_000));
        assert!(state.paused_by.is_none());
        assert_eq!(state.clock.paused_total(), 1_000);
    }

    #[test]
    fn test_pauser_disconnect_resumes_as_system() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");
        joined(&mut state, "charlie");
        started(&mut state, a);
        let end = state.clock.game_end().unwrap();

        assert_ok!(state.pause(b, T0 + 10_000));
        state.drain_outbound();
        state.handle_request(
            SessionRequest {
                conn_id: b,
                event: SessionEvent::Disconnected,
            },
            T0 + 12_000,
        );

        assert!(!state.is_paused());
        assert!(state.paused_by.is_none());
        assert_eq!(state.clock.game_end(), Some(end + 2_000));
        assert_eq!(state.phase, MatchPhase::Playing);

        let outbound = state.drain_outbound();
        let resumed_by = outbound.iter().find_map(|o| match o {
            Outbound::All(ServerMsg::GameResumed { resumed_by }) => Some(resumed_by.clone()),
            _ => None,
        });
        assert_eq!(resumed_by, Some(PlayerRef::system()));
        assert!(!outbound
            .iter()
            .any(|o| matches!(o, Outbound::All(ServerMsg::PlayerQuit { .. }))));
    }

    #[test]
    fn test_quit_broadcasts_and_ends_short_match() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");
        started(&mut state, a);
        state.drain_outbound();

        assert_ok!(state.quit(b, T0 + 8_000));
        assert_eq!(state.phase, MatchPhase::GameOver);

        let outbound = state.drain_outbound();
        assert!(outbound.iter().any(|o| matches!(
            o,
            Outbound::All(ServerMsg::PlayerQuit { quit_by }) if quit_by.username == "bravo"
        )));
        assert!(outbound
            .iter()
            .any(|o| matches!(o, Outbound::All(ServerMsg::GameEnded { .. }))));

        assert_eq!(state.quit(b, T0 + 9_000), Err(LobbyError::PlayerNotFound));
    }

    #[test]
    fn test_leaving_during_countdown_returns_to_waiting() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");
        assert_ok!(state.start_game(a, T0));
        assert_ok!(state.pause(a, T0 + 500));

        state.remove_player(b, T0 + 1_000);

        assert_eq!(state.phase, MatchPhase::Waiting);
        assert!(!state.is_paused());
        assert!(state.paused_by.is_none());
    }

    #[test]
    fn test_lead_reassigned_to_earliest_joiner() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");
        let c = joined(&mut state, "charlie");

        state.remove_player(a, T0);
        assert_eq!(state.lead_player, Some(b));
        assert_eq!(state.start_game(c, T0), Err(LobbyError::NotLeadPlayer));
        assert_ok!(state.start_game(b, T0));
    }

    #[test]
    fn test_empty_game_over_reopens_lobby() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        let b = joined(&mut state, "bravo");
        started(&mut state, a);
        state.end_match(T0 + 10_000);

        state.remove_player(a, T0 + 11_000);
        assert_eq!(state.phase, MatchPhase::GameOver);
        state.remove_player(b, T0 + 12_000);
        assert_eq!(state.phase, MatchPhase::Waiting);
        assert!(state.lead_player.is_none());

        let fresh = joined(&mut state, "delta");
        assert_eq!(state.lead_player, Some(fresh));
    }

    #[test]
    fn test_input_from_unknown_connection_ignored() {
        let mut state = lobby();
        let keys: HashMap<String, bool> = [("KeyW".to_string(), true)].into_iter().collect();
        state.handle_input(Uuid::new_v4(), keys.clone());
        assert!(state.drain_outbound().is_empty());

        let a = joined(&mut state, "alpha");
        state.handle_input(a, keys);
        assert!(state.store.player(&a).unwrap().is_pressed("KeyW"));
    }

    #[test]
    fn test_new_connection_gets_lobby_state() {
        let mut state = lobby();
        joined(&mut state, "alpha");
        state.drain_outbound();

        let watcher = Uuid::new_v4();
        state.handle_request(
            SessionRequest {
                conn_id: watcher,
                event: SessionEvent::Connected,
            },
            T0,
        );

        match state.drain_outbound().as_slice() {
            [Outbound::To(to, ServerMsg::LobbyState { state: phase, players, .. })] => {
                assert_eq!(*to, watcher);
                assert_eq!(*phase, MatchPhase::Waiting);
                assert_eq!(players.len(), 1);
                assert!(players[0].is_lead_player);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejections_use_error_reply() {
        let mut state = lobby();
        let a = joined(&mut state, "alpha");
        state.drain_outbound();

        state.handle_request(
            SessionRequest {
                conn_id: a,
                event: SessionEvent::Message(ClientMsg::StartGame),
            },
            T0,
        );

        match state.drain_outbound().as_slice() {
            [Outbound::To(to, ServerMsg::Error { code, message })] => {
                assert_eq!(*to, a);
                assert_eq!(code, "INVALID_PLAYER_COUNT");
                assert_eq!(message, "Need 2-4 players to start the game");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
