use std::ops::Range;

use ahash::AHashMap;
use serde_json::Value;
use tracing::warn;

use crate::state::dirty::as_int;

/// Tiles in a full amulet pool
pub const POOL_SIZE: usize = 108;
/// Pool indices holding the drawable segment
pub const DRAW_RANGE: Range<usize> = 23..59;
/// Pool indices holding the replacement queue
pub const REPLACE_RANGE: Range<usize> = 59..108;
pub const DRAW_SEGMENT_LEN: usize = DRAW_RANGE.end - DRAW_RANGE.start;
pub const REPLACE_QUEUE_LEN: usize = REPLACE_RANGE.end - REPLACE_RANGE.start;

/// Placeholder shown for ids without a known tile
pub const UNKNOWN_TILE: &str = "?";

/// Tile id
pub type TileId = u32;

/// One pool record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTile {
    pub id: TileId,
    pub tile: Option<String>,
}

impl PoolTile {
    fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(as_int)?;
        let id = TileId::try_from(id).ok()?;
        let tile = value.get("tile").and_then(|t| match t {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        Some(Self { id, tile })
    }
}

/// The ordered 108-tile pool with its derived segments.
///
/// Segments are cut by fixed index ranges when the pool is built and never
/// change afterwards; a new pool replaces the whole value.
#[derive(Debug, Clone, Default)]
pub struct TilePool {
    slots: Vec<Option<PoolTile>>,
    symbols: AHashMap<TileId, String>,
    draw_ids: Vec<TileId>,
    replace_ids: Vec<TileId>,
}

impl TilePool {
    /// Build from the raw pool array of a snapshot or diff.
    ///
    /// Malformed records keep their slot so indices never shift.
    pub fn from_values(values: &[Value]) -> Self {
        if values.len() != POOL_SIZE {
            warn!(len = values.len(), "amulet pool length unexpected");
        }
        let slots: Vec<Option<PoolTile>> = values.iter().map(PoolTile::from_value).collect();
        let malformed = slots.iter().filter(|s| s.is_none()).count();
        if malformed > 0 {
            warn!(malformed, "amulet pool has records without an id");
        }
        Self::from_slots(slots)
    }

    pub fn from_tiles(tiles: Vec<PoolTile>) -> Self {
        Self::from_slots(tiles.into_iter().map(Some).collect())
    }

    fn from_slots(slots: Vec<Option<PoolTile>>) -> Self {
        let symbols = slots
            .iter()
            .flatten()
            .filter_map(|t| t.tile.as_ref().map(|tile| (t.id, tile.clone())))
            .collect();
        let draw_ids = ids_in(&slots, DRAW_RANGE);
        let replace_ids = ids_in(&slots, REPLACE_RANGE);
        Self { slots, symbols, draw_ids, replace_ids }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ids of the drawable segment, in pool order
    pub fn draw_ids(&self) -> &[TileId] {
        &self.draw_ids
    }

    /// Ids of the replacement queue, in pool order
    pub fn replace_ids(&self) -> &[TileId] {
        &self.replace_ids
    }

    /// Tile code for an id, or `?`
    pub fn tile_of(&self, id: TileId) -> &str {
        self.symbols.get(&id).map(String::as_str).unwrap_or(UNKNOWN_TILE)
    }
}

fn ids_in(slots: &[Option<PoolTile>], range: Range<usize>) -> Vec<TileId> {
    let end = range.end.min(slots.len());
    let start = range.start.min(end);
    slots[start..end].iter().flatten().map(|t| t.id).collect()
}

/// Maps a pool tile code (`"5m"`, `"0p"`, `"7z"`...) to a display symbol
pub trait TileSymbols: Send + Sync {
    fn symbol(&self, tile: &str) -> String;
}

/// Shows tile codes as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTiles;

impl TileSymbols for PlainTiles {
    fn symbol(&self, tile: &str) -> String {
        tile.to_string()
    }
}

/// Shows tiles as Unicode mahjong glyphs, falling back to the code
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeTiles;

impl TileSymbols for UnicodeTiles {
    fn symbol(&self, tile: &str) -> String {
        tile_glyph(tile)
            .map(String::from)
            .unwrap_or_else(|| tile.to_string())
    }
}

/// Unicode glyph for a tile code. Red fives (`0m`/`0p`/`0s`) share the five's glyph.
pub fn tile_glyph(tile: &str) -> Option<char> {
    let mut chars = tile.chars();
    let rank = chars.next()?.to_digit(10)?;
    let suit = chars.next()?;
    if chars.next().is_some() {
        return None;
    }

    let base = match suit {
        'm' => 0x1F007,
        's' => 0x1F010,
        'p' => 0x1F019,
        'z' => return honor_glyph(rank),
        _ => return None,
    };
    let rank = if rank == 0 { 5 } else { rank };
    char::from_u32(base + rank - 1)
}

fn honor_glyph(rank: u32) -> Option<char> {
    let code = match rank {
        // east, south, west, north
        1..=4 => 0x1F000 + rank - 1,
        5 => 0x1F006, // white
        6 => 0x1F005, // green
        7 => 0x1F004, // red
        _ => return None,
    };
    char::from_u32(code)
}
