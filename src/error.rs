#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("malformed payload for {method}: {reason}")]
    MalformedPayload { method: String, reason: String },

    #[error("unknown frame kind: {0}")]
    UnknownFrameKind(String),

    #[error("interception server stopped")]
    InterceptionStopped,

    #[error("failed to start {subsystem}: {reason}")]
    SubsystemStart { subsystem: &'static str, reason: String },

    #[error("failed to create bot: {0}")]
    BotCreation(String),

    #[error("{collaborator} failed: {reason}")]
    Collaborator { collaborator: &'static str, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("frame channel closed")]
    ChannelClosed,

    #[error("orchestrator already started")]
    AlreadyStarted,

    #[error("orchestrator worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    pub fn collaborator(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Collaborator { collaborator, reason: reason.into() }
    }

    pub fn subsystem_start(subsystem: &'static str, reason: impl Into<String>) -> Self {
        Self::SubsystemStart { subsystem, reason: reason.into() }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
