//! Tiled pixel storage with a bounded, swap-backed cache
//!
//! Drawables are split into fixed-size tiles owned by a [`TileManager`].
//! Tiles are materialized on first reference, tracked by a shared
//! [`TileCache`] that keeps resident memory near a configured limit, and
//! written to a [`SwapStore`] when evicted. Each tile can carry per-row
//! opacity hints ([`RowHintTable`]) used to skip uniform rows.

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod manager;
pub mod row_hints;
pub mod swap;
pub mod tile;

pub use cache::{CacheStats, MemoryPressure, TileCache};
pub use config::{ConfigError, TileCacheConfig, TILE_SIZE};
pub use error::{SwapOp, TileError};
pub use format::PixelFormat;
pub use manager::{TileManager, TileValidator};
pub use row_hints::{classify_row, RowHint, RowHintTable};
pub use swap::{SwapFile, SwapStore};
pub use tile::{Access, ManagerId, Plane, Tile, TileData, TileDataMut, TileGuard, TileInfo, TileKey};
