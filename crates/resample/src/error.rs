use tessera_tiles::{PixelFormat, TileError};

/// Errors produced by resampling and compositing.
#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    #[error("source format {src:?} does not match destination format {dst:?}")]
    FormatMismatch { src: PixelFormat, dst: PixelFormat },

    #[error("source is {}x{}, destination is {}x{}", src.0, src.1, dst.0, dst.1)]
    SizeMismatch { src: (u32, u32), dst: (u32, u32) },

    #[error("source uses {src} pixel tiles, destination uses {dst}")]
    TileSizeMismatch { src: u32, dst: u32 },

    #[error("transform matrix is not invertible")]
    SingularMatrix,

    #[error("source and destination are the same plane")]
    InPlace,

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Tile(#[from] TileError),
}
