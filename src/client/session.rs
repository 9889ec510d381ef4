use serde::Serialize;
use tracing::{info, warn};

/// Flow ids of the active lobby and game connections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionFlows {
    pub lobby_flow_id: Option<String>,
    pub game_flow_id: Option<String>,
}

/// Result of a lobby login observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    /// A lobby flow is already active; it is kept
    Rejected { existing: String },
}

/// Result of a game start observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStart {
    Started,
    /// Same flow already tracked as the game
    Duplicate,
    /// Another flow was the game; it must be finalised first
    Replacing { previous: String },
}

/// Which tracked flows an END frame closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowEnd {
    pub game: bool,
    pub lobby: bool,
}

impl FlowEnd {
    pub fn is_noop(&self) -> bool {
        !self.game && !self.lobby
    }
}

/// Tracks at most one lobby flow and one game flow.
///
/// A field is only cleared by a matching END frame or an explicit finalize.
#[derive(Debug, Default)]
pub struct SessionTracker {
    flows: SessionFlows,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flows(&self) -> &SessionFlows {
        &self.flows
    }

    pub fn lobby_flow(&self) -> Option<&str> {
        self.flows.lobby_flow_id.as_deref()
    }

    pub fn game_flow(&self) -> Option<&str> {
        self.flows.game_flow_id.as_deref()
    }

    pub fn is_lobby_flow(&self, flow_id: &str) -> bool {
        self.lobby_flow() == Some(flow_id)
    }

    pub fn is_game_flow(&self, flow_id: &str) -> bool {
        self.game_flow() == Some(flow_id)
    }

    /// Record a login response seen on `flow_id`
    pub fn lobby_login(&mut self, flow_id: &str) -> LoginOutcome {
        match self.flows.lobby_flow_id {
            Some(ref existing) => {
                warn!(existing = %existing, new = %flow_id, "lobby flow exists, ignoring new lobby flow");
                LoginOutcome::Rejected { existing: existing.clone() }
            }
            None => {
                info!(flow_id = %flow_id, "lobby login done");
                self.flows.lobby_flow_id = Some(flow_id.to_string());
                LoginOutcome::Accepted
            }
        }
    }

    /// Check how a game start on `flow_id` relates to the tracked game.
    /// Does not change state; call [`Self::set_game_flow`] once handled.
    pub fn game_start(&self, flow_id: &str) -> GameStart {
        match self.game_flow() {
            None => GameStart::Started,
            Some(current) if current == flow_id => GameStart::Duplicate,
            Some(current) => GameStart::Replacing { previous: current.to_string() },
        }
    }

    pub fn set_game_flow(&mut self, flow_id: &str) {
        info!(flow_id = %flow_id, "game flow started");
        self.flows.game_flow_id = Some(flow_id.to_string());
    }

    /// Flows an END frame for `flow_id` closes. Does not clear them.
    pub fn ended_by(&self, flow_id: &str) -> FlowEnd {
        FlowEnd {
            game: self.is_game_flow(flow_id),
            lobby: self.is_lobby_flow(flow_id),
        }
    }

    pub fn clear_game(&mut self) {
        self.flows.game_flow_id = None;
    }

    pub fn clear_lobby(&mut self) {
        self.flows.lobby_flow_id = None;
    }
}
