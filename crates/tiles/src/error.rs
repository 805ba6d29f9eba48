use std::io;
use std::path::PathBuf;

/// Errors produced by tile access, swapping and tile-manager operations.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("out of memory allocating a {bytes} byte tile buffer")]
    OutOfMemory { bytes: usize },

    #[error("swap {op} of {len} bytes at offset {offset} failed: {source}")]
    SwapIo {
        op: SwapOp,
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("unable to create swap file in {}: {source}", dir.display())]
    SwapOpen {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tile ({row}, {col}) is outside the {rows}x{cols} tile grid")]
    OutOfBounds { row: u32, col: u32, rows: u32, cols: u32 },

    #[error("region {x},{y} {width}x{height} is outside the {max_width}x{max_height} drawable")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("tile was referenced for reading only")]
    ReadOnly,

    #[error("tile ({row}, {col}) still has {count} outstanding references")]
    Referenced { row: u32, col: u32, count: u32 },

    #[error("tile validation failed: {0}")]
    Validation(String),
}

impl TileError {
    /// Returns true for failures of the backing swap file.
    pub fn is_swap_error(&self) -> bool {
        matches!(self, TileError::SwapIo { .. } | TileError::SwapOpen { .. })
    }
}

/// Which swap operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOp {
    Read,
    Write,
    Truncate,
}

impl std::fmt::Display for SwapOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapOp::Read => write!(f, "read"),
            SwapOp::Write => write!(f, "write"),
            SwapOp::Truncate => write!(f, "truncate"),
        }
    }
}
