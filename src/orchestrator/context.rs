//! State owned by the orchestration worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::bot::{AmuletAdvisor, Automation, Bot, GameSession};
use crate::client::SessionTracker;
use crate::config::Gates;
use crate::error::Result;
use crate::orchestrator::health::ErrorState;
use crate::state::AmuletState;

/// Loop status published once per iteration for readers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStatus {
    pub lobby_flow: Option<String>,
    pub game_flow: Option<String>,
    pub in_game: bool,
    /// Frames taken off the queue and routed
    pub frames: u64,
    pub iterations: u64,
    pub fps: f64,
}

/// State shared between the worker and the handle
#[derive(Debug, Default)]
pub struct Shared {
    pub gates: Gates,
    pub errors: ErrorState,
    pub status: RwLock<LoopStatus>,
    stop: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    pub fn new(gates: Gates) -> Self {
        Self { gates, ..Default::default() }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Everything the routing code mutates, owned by the single worker
pub struct LoopContext {
    pub flows: SessionTracker,
    pub amulet: AmuletState,
    pub game: Option<GameSession>,
    pub bot: Option<Arc<dyn Bot>>,
    pub automation: Box<dyn Automation>,
    pub advisor: Option<Box<dyn AmuletAdvisor>>,
    pub shared: Arc<Shared>,
    pub idle_intensity: f64,
}

impl LoopContext {
    pub fn new(shared: Arc<Shared>, automation: Box<dyn Automation>) -> Self {
        Self {
            flows: SessionTracker::new(),
            amulet: AmuletState::new(),
            game: None,
            bot: None,
            automation,
            advisor: None,
            shared,
            idle_intensity: 0.05,
        }
    }

    pub fn with_advisor(mut self, advisor: Box<dyn AmuletAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_idle_intensity(mut self, intensity: f64) -> Self {
        self.idle_intensity = intensity;
        self
    }

    pub fn is_in_game(&self) -> bool {
        self.game.is_some()
    }

    /// End the current game: drop its session, clear the game error and
    /// notify automation. Safe to call without a game.
    pub fn finalize_game(&mut self) -> Result<()> {
        if let Some(game) = self.game.take() {
            info!(flow_id = %game.flow_id(), messages = game.message_count(), "game finalized");
        }
        self.shared.errors.clear_game();
        self.automation.on_end_game()
    }
}

impl std::fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopContext")
            .field("flows", self.flows.flows())
            .field("amulet_active", &self.amulet.is_active())
            .field("game", &self.game)
            .field("bot", &self.bot.as_deref().map(|b| b.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AutomationEvent, EventCollector};
    use crate::error::Error;

    #[test]
    fn test_finalize_game() {
        let collector = EventCollector::new();
        let shared = Arc::new(Shared::default());
        let mut ctx = LoopContext::new(shared.clone(), Box::new(collector.clone()));

        ctx.game = Some(GameSession::new("g1", None));
        shared.errors.set_game(Error::BotCreation("boom".into()));

        ctx.finalize_game().unwrap();
        assert!(!ctx.is_in_game());
        assert!(shared.errors.game().is_none());
        assert_eq!(collector.drain(), vec![AutomationEvent::EndGame]);
    }

    #[test]
    fn test_stop_flag() {
        let shared = Shared::default();
        assert!(!shared.stop_requested());
        shared.request_stop();
        assert!(shared.stop_requested());
    }
}
