//! Amulet mini-game state rebuilt from snapshots and dirty diffs
//!
//! Four events drive it: `fetch` (full snapshot, possibly mid-session),
//! `upgrade` and `operate` (batched dirty diffs) and `giveup` (teardown).
//! Every pool (re)set resets the counters derived from it.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::AmuletMethod;
use crate::state::dirty::{as_int, truthy, Field};
use crate::state::render;
use crate::state::tiles::{TileId, TilePool, TileSymbols, DRAW_SEGMENT_LEN, REPLACE_QUEUE_LEN};

/// Stage during which the replacement queue is shown
pub const REPLACE_STAGE: i64 = 2;

/// Lightweight display snapshot of the mini-game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmuletMeta {
    pub stage: i64,
    pub hands: Vec<i64>,
    pub desktop_remain: i64,
    pub ended: bool,
}

/// Suggested next step for the mini-game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmuletAction {
    pub kind: String,
    #[serde(default)]
    pub args: Value,
}

impl AmuletAction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), args: Value::Null }
    }
}

/// Reconciled amulet state
#[derive(Debug, Clone, Default)]
pub struct AmuletState {
    active: bool,
    meta: AmuletMeta,
    pending: Option<AmuletAction>,
    pool: Option<Arc<TilePool>>,
    used_ids: BTreeSet<TileId>,
    desktop_remain: i64,
    replace_cursor: i64,
}

impl AmuletState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one RESPONSE of the amulet family
    pub fn apply(&mut self, method: AmuletMethod, data: &Value) {
        match method {
            AmuletMethod::Fetch => self.on_fetch(data),
            AmuletMethod::Upgrade => self.on_upgrade(data),
            AmuletMethod::Operate => self.on_operate(data),
            AmuletMethod::Giveup => self.on_giveup(),
            AmuletMethod::Unknown => debug!("amulet method without reconciliation"),
        }
    }

    /// Full snapshot; may resume a session already in progress.
    ///
    /// The response nests the activity under `data.game`; a bare `game` is
    /// accepted when the outer wrapper is missing.
    pub fn on_fetch(&mut self, data: &Value) {
        self.active = true;
        let Some(game) = snapshot_game(data) else {
            debug!("amulet fetch without game data");
            return;
        };
        let round = game.get("round").cloned().unwrap_or(Value::Null);

        if let Some(pool) = round.get("pool").and_then(Value::as_array) {
            if !pool.is_empty() {
                self.set_pool(pool);
            }
        }

        self.meta.stage = game.get("stage").and_then(as_int).unwrap_or(0);
        self.meta.ended = game.get("ended").map(truthy).unwrap_or(false);
        if let Some(hands) = round.get("hands").and_then(Value::as_array) {
            self.meta.hands = hands.iter().filter_map(as_int).collect();
        }

        if let Some(remain) = round.get("desktopRemain") {
            let remain = as_int(remain).unwrap_or(0);
            self.meta.desktop_remain = remain;
            self.desktop_remain = remain;
        }
        self.used_ids = match round.get("usedDesktop").and_then(Value::as_array) {
            Some(used) => ids_from(used),
            None => BTreeSet::new(),
        };
        if let Some(history) = round.get("used").and_then(Value::as_array) {
            self.replace_cursor = history.len() as i64;
        }
    }

    /// Batched diff that may carry a fresh pool
    pub fn on_upgrade(&mut self, data: &Value) {
        self.active = true;
        let events = events_of(data);
        for round in events.iter().filter_map(|ev| round_of(ev)) {
            let pool = match Field::<Vec<Value>>::read_required(round, "pool") {
                Field::Dirty(pool) if pool.is_empty() => {
                    warn!("ignoring empty amulet pool");
                    Field::Malformed
                }
                other => other,
            };
            let pool_reset = pool.is_dirty();
            pool.apply_if_dirty(|pool| self.set_pool(&pool));
            self.apply_counters(round);
            if pool_reset {
                debug!(remain = self.desktop_remain, cursor = self.replace_cursor, "amulet pool replaced by upgrade");
            }
        }
        self.refresh_meta(&events);
    }

    /// Batched diff for draws and replacements
    pub fn on_operate(&mut self, data: &Value) {
        self.active = true;
        let events = events_of(data);
        for round in events.iter().filter_map(|ev| round_of(ev)) {
            Field::<Vec<Value>>::read(round, "usedDesktop").apply_if_dirty(|used| {
                self.used_ids = ids_from(&used);
            });
            self.apply_counters(round);
        }
        self.refresh_meta(&events);
    }

    /// Drop everything and go inactive
    pub fn on_giveup(&mut self) {
        *self = Self::default();
    }

    // Count and history fields shared by upgrade and operate. They land after
    // any pool reset in the same record, so explicit values win over defaults.
    fn apply_counters(&mut self, round: &Value) {
        Field::<i64>::read(round, "desktopRemain").apply_if_dirty(|remain| {
            self.desktop_remain = remain;
        });
        Field::<Vec<Value>>::read(round, "used").apply_if_dirty(|history| {
            self.replace_cursor = history.len() as i64;
        });
    }

    fn set_pool(&mut self, values: &[Value]) {
        self.pool = Some(Arc::new(TilePool::from_values(values)));
        self.used_ids.clear();
        self.desktop_remain = DRAW_SEGMENT_LEN as i64;
        self.replace_cursor = 0;
    }

    fn refresh_meta(&mut self, events: &[Value]) {
        for vc in events.iter().filter_map(|ev| ev.get("valueChanges")) {
            if let Some(stage) = vc.get("stage") {
                match as_int(stage) {
                    Some(stage) => self.meta.stage = stage,
                    None => warn!("amulet stage is not an integer: {}", stage),
                }
            }
            if let Some(round) = vc.get("round") {
                Field::<Vec<i64>>::read(round, "hands").apply_if_dirty(|hands| {
                    self.meta.hands = hands;
                });
                Field::<i64>::read(round, "desktopRemain").apply_if_dirty(|remain| {
                    self.meta.desktop_remain = remain;
                });
            }
            if let Some(ended) = vc.get("ended") {
                self.meta.ended = truthy(ended);
            }
        }
    }

    pub fn set_pending_action(&mut self, action: Option<AmuletAction>) {
        self.pending = action;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Meta snapshot while active
    pub fn meta(&self) -> Option<AmuletMeta> {
        self.active.then(|| self.meta.clone())
    }

    pub fn pending_action(&self) -> Option<AmuletAction> {
        self.pending.clone()
    }

    pub fn pool(&self) -> Option<&TilePool> {
        self.pool.as_deref()
    }

    pub fn draw_ids(&self) -> &[TileId] {
        self.pool.as_deref().map(TilePool::draw_ids).unwrap_or(&[])
    }

    pub fn replace_ids(&self) -> &[TileId] {
        self.pool.as_deref().map(TilePool::replace_ids).unwrap_or(&[])
    }

    /// Ids already drawn, ascending
    pub fn used_ids(&self) -> Vec<TileId> {
        self.used_ids.iter().copied().collect()
    }

    /// Drawable tiles left, clamped to the segment size
    pub fn desktop_remain(&self) -> usize {
        self.desktop_remain.clamp(0, DRAW_SEGMENT_LEN as i64) as usize
    }

    /// Replacement queue items consumed, clamped to the queue size
    pub fn replace_cursor(&self) -> usize {
        self.replace_cursor.clamp(0, REPLACE_QUEUE_LEN as i64) as usize
    }

    /// Text for the remaining drawable tiles, empty when nothing is known
    pub fn drawable_text(&self, symbols: &dyn TileSymbols) -> String {
        match self.active_pool() {
            Some(pool) if !pool.draw_ids().is_empty() => {
                render::drawable_text(pool, pool.draw_ids(), self.desktop_remain(), symbols)
            }
            _ => String::new(),
        }
    }

    /// Text for the replacement queue; only shown in the replacement stage
    pub fn replace_text(&self, symbols: &dyn TileSymbols) -> String {
        match self.active_pool() {
            Some(pool) if !pool.replace_ids().is_empty() && self.meta.stage == REPLACE_STAGE => {
                render::replace_text(pool, pool.replace_ids(), self.replace_cursor(), symbols)
            }
            _ => String::new(),
        }
    }

    /// Tile codes of the replacement queue in pool order
    pub fn replace_queue(&self) -> Vec<String> {
        match self.active_pool() {
            Some(pool) => pool
                .replace_ids()
                .iter()
                .map(|id| pool.tile_of(*id).to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    fn active_pool(&self) -> Option<&TilePool> {
        if !self.active {
            return None;
        }
        self.pool.as_deref().filter(|p| !p.is_empty())
    }
}

fn snapshot_game(data: &Value) -> Option<&Value> {
    let outer = data.get("data").filter(|d| d.is_object()).unwrap_or(data);
    outer.get("game").filter(|g| truthy(g))
}

fn events_of(data: &Value) -> Vec<Value> {
    match data.get("events") {
        Some(Value::Array(events)) => events.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("amulet events is not an array: {}", other);
            Vec::new()
        }
    }
}

fn round_of(event: &Value) -> Option<&Value> {
    event.get("valueChanges")?.get("round").filter(|r| r.is_object())
}

fn ids_from(values: &[Value]) -> BTreeSet<TileId> {
    values
        .iter()
        .filter_map(|v| {
            let id = as_int(v).and_then(|id| TileId::try_from(id).ok());
            if id.is_none() {
                warn!("skipping malformed tile id: {}", v);
            }
            id
        })
        .collect()
}
