//! Persistent settings and runtime gates

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::state::{PlainTiles, TileSymbols, UnicodeTiles};

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mahjong-observer")
}

/// How tiles are shown in the text views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileStyle {
    #[default]
    Plain,
    Unicode,
}

impl TileStyle {
    pub fn symbols(self) -> Arc<dyn TileSymbols> {
        match self {
            Self::Plain => Arc::new(PlainTiles),
            Self::Unicode => Arc::new(UnicodeTiles),
        }
    }
}

/// Observer settings, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enable_overlay: bool,
    pub enable_automation: bool,
    pub auto_join_game: bool,
    pub enable_injector: bool,
    pub inject_process_name: String,
    pub intercept_port: u16,
    pub auto_launch_frontend: bool,
    /// Sleep when the frame queue is empty
    pub idle_backoff_ms: u64,
    pub idle_intensity: f64,
    pub tile_style: TileStyle,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_overlay: true,
            enable_automation: false,
            auto_join_game: false,
            enable_injector: false,
            inject_process_name: "jantama_mahjongsoul".into(),
            intercept_port: 10999,
            auto_launch_frontend: false,
            idle_backoff_ms: 2,
            idle_intensity: 0.05,
            tile_style: TileStyle::Plain,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        config_dir().join("settings.json")
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "settings file missing, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

bitflags! {
    /// Runtime toggles read by the orchestration loop every iteration
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Gate: u8 {
        const OVERLAY = 0x01;
        const AUTOMATION = 0x02;
        const AUTO_JOIN = 0x04;
        /// Rebuild the decision bot when no game is running
        const BOT_UPDATE = 0x08;
        /// Restart interception and injection when nothing uses them
        const SUBSYSTEM_RESTART = 0x10;
    }
}

/// Lock-free gate set. Each toggle is an independent atomic write.
#[derive(Debug, Default)]
pub struct Gates {
    bits: AtomicU8,
}

impl Gates {
    pub fn new(initial: Gate) -> Self {
        Self { bits: AtomicU8::new(initial.bits()) }
    }

    /// Initial gates for `settings`; the bot is always built on first iteration
    pub fn from_settings(settings: &Settings) -> Self {
        let mut gate = Gate::BOT_UPDATE;
        gate.set(Gate::OVERLAY, settings.enable_overlay);
        gate.set(Gate::AUTOMATION, settings.enable_automation);
        gate.set(Gate::AUTO_JOIN, settings.auto_join_game);
        Self::new(gate)
    }

    pub fn set(&self, gate: Gate, on: bool) {
        if on {
            self.bits.fetch_or(gate.bits(), Ordering::AcqRel);
        } else {
            self.bits.fetch_and(!gate.bits(), Ordering::AcqRel);
        }
    }

    pub fn is_set(&self, gate: Gate) -> bool {
        self.snapshot().contains(gate)
    }

    pub fn snapshot(&self) -> Gate {
        Gate::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }
}
