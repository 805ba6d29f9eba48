//! Pixel operations over tiled drawables
//!
//! [`transform_tiles`] resamples one drawable into another through a
//! [`Matrix3`](tessera_transform::Matrix3), and [`composite_over`] blends two
//! drawables using the row hints kept on each tile. Both read and write
//! through tile references, so they work on drawables larger than the tile
//! cache.

pub mod cancel;
pub mod composite;
pub mod error;
pub mod progress;
pub mod transform;

pub use cancel::CancellationToken;
pub use composite::{composite_over, CompositeReport};
pub use error::ResampleError;
pub use progress::{NoProgress, ProgressSink};
pub use transform::{transform_tiles, Interpolation, TransformOptions, TransformReport};
