pub mod amulet;
pub mod dirty;
pub mod render;
pub mod tiles;

pub use amulet::{AmuletAction, AmuletMeta, AmuletState, REPLACE_STAGE};
pub use dirty::Field;
pub use tiles::{
    PlainTiles, PoolTile, TileId, TilePool, TileSymbols, UnicodeTiles,
    DRAW_RANGE, DRAW_SEGMENT_LEN, POOL_SIZE, REPLACE_QUEUE_LEN, REPLACE_RANGE,
};
