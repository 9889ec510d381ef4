//! Display text for the amulet views
//!
//! Pure functions over a pool and a few counters. The symbol table is passed
//! in by the caller so rendering can be tested with any lookup.

use std::collections::BTreeMap;

use crate::state::tiles::{TileId, TilePool, TileSymbols, DRAW_SEGMENT_LEN};

pub const ROW_WIDTH: usize = 9;
pub const CURSOR_MARKER: &str = "｜";

/// Header, tile rows and tally for the tiles still drawable.
///
/// The remaining `remain` tiles are the tail of the draw segment. Rows are
/// laid out so every row but the first holds exactly nine tiles.
pub fn drawable_text(
    pool: &TilePool,
    draw_ids: &[TileId],
    remain: usize,
    symbols: &dyn TileSymbols,
) -> String {
    let remain = remain.min(draw_ids.len());
    let header = format!("[Drawable {}/{}]", remain, DRAW_SEGMENT_LEN);
    if remain == 0 {
        return header;
    }

    let tiles: Vec<&str> = draw_ids[draw_ids.len() - remain..]
        .iter()
        .map(|id| pool.tile_of(*id))
        .collect();

    let mut lines = vec![header];
    for row in rows_tail_first(&tiles) {
        lines.push(
            row.iter()
                .map(|t| symbols.symbol(t))
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    lines.push(tally(&tiles, symbols));
    lines.join("\n")
}

/// Header plus the full replacement queue with the cursor marker inserted
pub fn replace_text(
    pool: &TilePool,
    queue: &[TileId],
    cursor: usize,
    symbols: &dyn TileSymbols,
) -> String {
    let cursor = cursor.min(queue.len());
    let mut seq: Vec<String> = queue
        .iter()
        .map(|id| symbols.symbol(pool.tile_of(*id)))
        .collect();
    seq.insert(cursor, CURSOR_MARKER.to_string());

    format!("[Replace {}/{}]\n{}", cursor, queue.len(), seq.join(" "))
}

/// Split into rows of nine where the first row takes the remainder
pub fn rows_tail_first<T>(seq: &[T]) -> Vec<&[T]> {
    let mut rows = Vec::new();
    let head = seq.len() % ROW_WIDTH;
    if head != 0 {
        rows.push(&seq[..head]);
    }
    rows.extend(seq[head..].chunks(ROW_WIDTH));
    rows
}

fn tally(tiles: &[&str], symbols: &dyn TileSymbols) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tile in tiles {
        *counts.entry(*tile).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(tile, n)| format!("{}×{}", symbols.symbol(tile), n))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tiles::{PlainTiles, PoolTile};

    fn pool_of(ids: &[(TileId, &str)]) -> TilePool {
        TilePool::from_tiles(
            ids.iter()
                .map(|(id, tile)| PoolTile { id: *id, tile: Some(tile.to_string()) })
                .collect(),
        )
    }

    #[test]
    fn test_rows_tail_first() {
        let seq: Vec<u32> = (0..10).collect();
        let rows = rows_tail_first(&seq);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], [0]);
        assert_eq!(rows[1].len(), 9);

        let seq: Vec<u32> = (0..36).collect();
        let rows = rows_tail_first(&seq);
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.len() == 9));

        assert!(rows_tail_first::<u32>(&[]).is_empty());
    }

    #[test]
    fn test_drawable_uses_tail() {
        let pool = pool_of(&[(1, "1m"), (2, "2m"), (3, "3m"), (4, "3m")]);
        let text = drawable_text(&pool, &[1, 2, 3, 4], 3, &PlainTiles);
        assert_eq!(text, "[Drawable 3/36]\n2m 3m 3m\n2m×1 3m×2");
    }

    #[test]
    fn test_drawable_zero_is_header_only() {
        let pool = pool_of(&[(1, "1m")]);
        assert_eq!(drawable_text(&pool, &[1], 0, &PlainTiles), "[Drawable 0/36]");
    }

    #[test]
    fn test_replace_marker_position() {
        let pool = pool_of(&[(1, "1z"), (2, "2z"), (3, "3z")]);
        assert_eq!(replace_text(&pool, &[1, 2, 3], 0, &PlainTiles), "[Replace 0/3]\n｜ 1z 2z 3z");
        assert_eq!(replace_text(&pool, &[1, 2, 3], 2, &PlainTiles), "[Replace 2/3]\n1z 2z ｜ 3z");
        assert_eq!(replace_text(&pool, &[1, 2, 3], 99, &PlainTiles), "[Replace 3/3]\n1z 2z 3z ｜");
    }
}
