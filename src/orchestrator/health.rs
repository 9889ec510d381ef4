//! Error severities and loop diagnostics

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::error::Error;

/// Fatal and game-level errors, readable from any thread.
///
/// A fatal error ends the loop and stays for post-mortem inspection. A game
/// error is scoped: it is cleared when its cause goes away or the game ends.
#[derive(Debug, Default)]
pub struct ErrorState {
    fatal: Mutex<Option<Error>>,
    game: Mutex<Option<Error>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fatal(&self, err: Error) {
        error!("fatal loop error: {}", err);
        *self.fatal.lock() = Some(err);
    }

    pub fn fatal(&self) -> Option<Error> {
        self.fatal.lock().clone()
    }

    pub fn set_game(&self, err: Error) {
        let mut game = self.game.lock();
        // repeated conditions (interception down) are set every iteration
        if game.as_ref().map(|e| e.to_string()) != Some(err.to_string()) {
            warn!("game error: {}", err);
        }
        *game = Some(err);
    }

    pub fn game(&self) -> Option<Error> {
        self.game.lock().clone()
    }

    pub fn has_game_error(&self) -> bool {
        self.game.lock().is_some()
    }

    pub fn clear_game(&self) {
        *self.game.lock() = None;
    }

    /// Clear the game error only if `pred` matches it
    pub fn clear_game_if(&self, pred: impl FnOnce(&Error) -> bool) -> bool {
        let mut game = self.game.lock();
        if game.as_ref().is_some_and(pred) {
            *game = None;
            true
        } else {
            false
        }
    }
}

/// Counts loop iterations and reports a rate over the last window
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    window_start: Instant,
    window_frames: u64,
    total: u64,
    fps: f64,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            window_frames: 0,
            total: 0,
            fps: 0.0,
        }
    }

    pub fn frame(&mut self) {
        self.frame_at(Instant::now());
    }

    fn frame_at(&mut self, now: Instant) {
        self.total += 1;
        self.window_frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window {
            self.fps = self.window_frames as f64 / elapsed.as_secs_f64();
            self.window_frames = 0;
            self.window_start = now;
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
