//! Match timing: countdown, match deadline and pause accounting
//!
//! All timestamps are Unix milliseconds supplied by the caller. Every pause
//! is added to `paused_total` and pushes the match deadline back by the same
//! amount, so the playable duration never changes no matter how often the
//! match is paused.

use crate::util::time::millis_until;

use super::rules::{COUNTDOWN_DURATION_MS, MATCH_DURATION_MS};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchClock {
    countdown_start: Option<u64>,
    game_end: Option<u64>,
    pause_start: Option<u64>,
    paused_total: u64,
}

impl MatchClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything and start counting down from `now`
    pub fn start_countdown(&mut self, now: u64) {
        *self = Self {
            countdown_start: Some(now),
            ..Self::default()
        };
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Arm the match deadline
    pub fn start_match(&mut self, now: u64) {
        self.game_end = Some(now + MATCH_DURATION_MS);
    }

    pub fn pause(&mut self, now: u64) {
        if self.pause_start.is_none() {
            self.pause_start = Some(now);
        }
    }

    /// Close the current pause, returns how long it lasted
    pub fn resume(&mut self, now: u64) -> u64 {
        let Some(started) = self.pause_start.take() else {
            return 0;
        };
        let paused_for = now.saturating_sub(started);
        self.paused_total += paused_for;
        if let Some(end) = self.game_end.as_mut() {
            *end += paused_for;
        }
        paused_for
    }

    pub fn is_paused(&self) -> bool {
        self.pause_start.is_some()
    }

    pub fn game_end(&self) -> Option<u64> {
        self.game_end
    }

    pub fn paused_total(&self) -> u64 {
        self.paused_total
    }

    /// Countdown time that has actually run, excluding every pause
    fn countdown_elapsed(&self, now: u64) -> u64 {
        let Some(start) = self.countdown_start else {
            return 0;
        };
        let in_progress = self.pause_start.map_or(0, |p| now.saturating_sub(p));
        now.saturating_sub(start)
            .saturating_sub(self.paused_total)
            .saturating_sub(in_progress)
    }

    pub fn countdown_remaining_ms(&self, now: u64) -> u64 {
        COUNTDOWN_DURATION_MS.saturating_sub(self.countdown_elapsed(now))
    }

    pub fn countdown_finished(&self, now: u64) -> bool {
        self.countdown_start.is_some() && self.countdown_remaining_ms(now) == 0
    }

    /// Whether the (pause-adjusted) match deadline has passed
    pub fn time_up(&self, now: u64) -> bool {
        self.game_end.map_or(false, |end| now >= end)
    }

    /// Match time left; frozen at the pause instant while paused
    pub fn match_remaining_ms(&self, now: u64) -> u64 {
        let reference = self.pause_start.unwrap_or(now);
        self.game_end.map_or(0, |end| millis_until(end, reference))
    }

    /// Countdown seconds for display, rounded up
    pub fn countdown_secs(&self, now: u64) -> u64 {
        self.countdown_remaining_ms(now).div_ceil(1000)
    }

    /// Match seconds for display, rounded down
    pub fn timer_secs(&self, now: u64) -> u64 {
        self.match_remaining_ms(now) / 1000
    }
}
