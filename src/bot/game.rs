use std::sync::Arc;

use tracing::debug;

use crate::bot::{Bot, Reaction};
use crate::error::{Error, Result};
use crate::protocol::DecodedMessage;

/// State of one in-progress game, bound to the game flow
pub struct GameSession {
    flow_id: String,
    bot: Option<Arc<dyn Bot>>,
    pending: Option<Reaction>,
    messages: u64,
}

impl GameSession {
    pub fn new(flow_id: impl Into<String>, bot: Option<Arc<dyn Bot>>) -> Self {
        Self {
            flow_id: flow_id.into(),
            bot,
            pending: None,
            messages: 0,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn bot_name(&self) -> Option<&str> {
        self.bot.as_deref().map(|b| b.name())
    }

    /// Number of messages fed so far
    pub fn message_count(&self) -> u64 {
        self.messages
    }

    /// Latest reaction not yet acted on
    pub fn pending_reaction(&self) -> Option<&Reaction> {
        self.pending.as_ref()
    }

    pub fn take_pending_reaction(&mut self) -> Option<Reaction> {
        self.pending.take()
    }

    /// Feed one game-flow message to the bot
    pub fn input(&mut self, msg: &DecodedMessage) -> Result<Option<Reaction>> {
        self.messages += 1;
        let bot = self
            .bot
            .as_ref()
            .ok_or_else(|| Error::collaborator("bot", "no bot loaded for game"))?;
        let reaction = bot.react(msg)?;
        if let Some(ref r) = reaction {
            debug!(flow_id = %self.flow_id, method = %msg.method, "bot reaction: {}", r);
            self.pending = Some(r.clone());
        }
        Ok(reaction)
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("flow_id", &self.flow_id)
            .field("bot", &self.bot_name())
            .field("messages", &self.messages)
            .finish()
    }
}
