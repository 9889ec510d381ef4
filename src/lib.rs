//! Mahjong Observer
//!
//! Follows intercepted game traffic frame by frame, tracks the lobby and
//! game flows, and rebuilds the amulet mini-game state from snapshots and
//! dirty-flagged diffs for automation and display.

pub mod error;
pub mod config;
pub mod protocol;
pub mod state;
pub mod client;
pub mod bot;
pub mod subsystem;
pub mod orchestrator;

pub use error::{Error, Result};
pub use config::{Gate, Gates, Settings, TileStyle};
pub use protocol::{
    DecodedMessage, FrameKind, JsonParser, MethodCategory, MsgType,
    ProtocolParser, WireFrame,
};
pub use state::{
    AmuletAction, AmuletMeta, AmuletState, PlainTiles, TilePool,
    TileSymbols, UnicodeTiles,
};
pub use client::{AutomationEvent, EventCollector, MessageRouter, RouteOutcome, SessionTracker};
pub use bot::{AmuletAdvisor, Automation, Bot, BotFactory, GameSession};
pub use subsystem::{Frontend, Injector, Interceptor, ReplayInterceptor};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, StatusReport};
