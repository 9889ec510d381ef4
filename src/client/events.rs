use std::sync::Arc;

use parking_lot::Mutex;

use crate::bot::{Automation, GameSession};
use crate::error::Result;
use crate::protocol::DecodedMessage;

/// Automation calls made by the orchestration loop
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationEvent {
    /// Lobby login observed
    LobbyLogin {
        method: String,
    },

    /// Lobby flow ended
    ExitLobby,

    /// Game flow ended
    EndGame,

    /// Idle automation requested
    Idle {
        intensity: f64,
    },
}

#[derive(Debug, Default)]
struct Collected {
    events: Vec<AutomationEvent>,
    retry_sweeps: u64,
    retry_sweeps_in_game: u64,
    lobby_decisions: u64,
}

/// Automation that only records what it was asked to do.
///
/// Clones share one log, so a clone handed to the loop can be inspected
/// from outside. Periodic calls are counted rather than stored.
#[derive(Debug, Clone, Default)]
pub struct EventCollector {
    inner: Arc<Mutex<Collected>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<AutomationEvent> {
        std::mem::take(&mut self.inner.lock().events)
    }

    pub fn events(&self) -> Vec<AutomationEvent> {
        self.inner.lock().events.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn retry_sweeps(&self) -> u64 {
        self.inner.lock().retry_sweeps
    }

    pub fn retry_sweeps_in_game(&self) -> u64 {
        self.inner.lock().retry_sweeps_in_game
    }

    pub fn lobby_decisions(&self) -> u64 {
        self.inner.lock().lobby_decisions
    }

    fn push(&self, event: AutomationEvent) {
        self.inner.lock().events.push(event);
    }
}

impl Automation for EventCollector {
    fn on_lobby_login(&mut self, msg: &DecodedMessage) -> Result<()> {
        self.push(AutomationEvent::LobbyLogin { method: msg.method.clone() });
        Ok(())
    }

    fn on_exit_lobby(&mut self) -> Result<()> {
        self.push(AutomationEvent::ExitLobby);
        Ok(())
    }

    fn on_end_game(&mut self) -> Result<()> {
        self.push(AutomationEvent::EndGame);
        Ok(())
    }

    fn automate_retry_pending(&mut self, game: Option<&GameSession>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.retry_sweeps += 1;
        if game.is_some() {
            inner.retry_sweeps_in_game += 1;
        }
        Ok(())
    }

    fn decide_lobby_action(&mut self, _auto_join: bool) -> Result<()> {
        self.inner.lock().lobby_decisions += 1;
        Ok(())
    }

    fn automate_idle(&mut self, intensity: f64) -> Result<()> {
        self.push(AutomationEvent::Idle { intensity });
        Ok(())
    }
}
