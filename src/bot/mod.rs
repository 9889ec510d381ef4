//! Collaborators driven by the orchestration loop
//!
//! The decision engine, UI automation and the amulet advisor live outside
//! this crate. The loop talks to them only through these traits.

pub mod game;

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::protocol::DecodedMessage;
use crate::state::{AmuletAction, AmuletMeta};

pub use game::GameSession;

/// Reaction produced by a decision bot for an in-game message
pub type Reaction = Value;

/// Decision engine for an active game
pub trait Bot: Send + Sync {
    fn name(&self) -> &str;

    /// React to one message of the game flow
    fn react(&self, msg: &DecodedMessage) -> Result<Option<Reaction>>;
}

/// Builds (or rebuilds) the decision bot
pub trait BotFactory: Send {
    fn create(&self) -> Result<Arc<dyn Bot>>;
}

impl<F> BotFactory for F
where
    F: Fn() -> Result<Arc<dyn Bot>> + Send,
{
    fn create(&self) -> Result<Arc<dyn Bot>> {
        self()
    }
}

/// UI automation. Every call is fire-and-forget; failures become game errors.
pub trait Automation: Send {
    fn on_lobby_login(&mut self, msg: &DecodedMessage) -> Result<()>;

    fn on_exit_lobby(&mut self) -> Result<()>;

    fn on_end_game(&mut self) -> Result<()>;

    /// Retry previously failed actions, given the current game (if any)
    fn automate_retry_pending(&mut self, game: Option<&GameSession>) -> Result<()>;

    fn decide_lobby_action(&mut self, auto_join: bool) -> Result<()>;

    fn automate_idle(&mut self, intensity: f64) -> Result<()>;
}

/// Suggests the next amulet step from the current meta
pub trait AmuletAdvisor: Send {
    fn decide(&mut self, meta: &AmuletMeta) -> Result<Option<AmuletAction>>;
}
