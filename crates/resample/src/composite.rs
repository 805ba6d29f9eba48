//! Alpha-over compositing between tiled drawables, accelerated by row hints

use rayon::prelude::*;
use tessera_tiles::{Access, PixelFormat, Plane, RowHint, TileManager};

use crate::error::ResampleError;

/// How the rows of the source were handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompositeReport {
    /// Fully transparent rows, left untouched in the destination
    pub rows_skipped: usize,
    /// Fully opaque rows copied as-is
    pub rows_copied: usize,
    /// Rows blended pixel by pixel
    pub rows_blended: usize,
}

impl CompositeReport {
    fn merge(self, other: CompositeReport) -> CompositeReport {
        CompositeReport {
            rows_skipped: self.rows_skipped + other.rows_skipped,
            rows_copied: self.rows_copied + other.rows_copied,
            rows_blended: self.rows_blended + other.rows_blended,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.rows_skipped + self.rows_copied + self.rows_blended
    }
}

/// Composite the main plane of `src` over the main plane of `dst`.
///
/// `opacity` is clamped to `0.0..=1.0`. Both drawables must share size,
/// format and tile size. Destination tiles under fully transparent source
/// tiles are not referenced at all, so they stay clean.
pub fn composite_over(
    src: &TileManager,
    dst: &TileManager,
    opacity: f64,
) -> Result<CompositeReport, ResampleError> {
    if src.format() != dst.format() {
        return Err(ResampleError::FormatMismatch {
            src: src.format(),
            dst: dst.format(),
        });
    }
    if (src.width(), src.height()) != (dst.width(), dst.height()) {
        return Err(ResampleError::SizeMismatch {
            src: (src.width(), src.height()),
            dst: (dst.width(), dst.height()),
        });
    }
    if src.tile_size() != dst.tile_size() {
        return Err(ResampleError::TileSizeMismatch {
            src: src.tile_size(),
            dst: dst.tile_size(),
        });
    }
    if src.id() == dst.id() {
        return Err(ResampleError::InPlace);
    }

    let opacity = (opacity.clamp(0.0, 1.0) * 255.0).round() as u32;
    let report = (0..src.rows())
        .into_par_iter()
        .map(|row| {
            (0..src.cols()).try_fold(CompositeReport::default(), |report, col| {
                let tile = composite_tile(src, dst, row, col, opacity)?;
                Ok::<_, ResampleError>(report.merge(tile))
            })
        })
        .try_reduce(CompositeReport::default, |a, b| Ok(a.merge(b)))?;

    log::debug!(
        "composited manager {} over {}: {} rows skipped, {} copied, {} blended",
        src.id().get(),
        dst.id().get(),
        report.rows_skipped,
        report.rows_copied,
        report.rows_blended
    );
    Ok(report)
}

fn composite_tile(
    src: &TileManager,
    dst: &TileManager,
    row: u32,
    col: u32,
    opacity: u32,
) -> Result<CompositeReport, ResampleError> {
    let source = src.acquire(row, col, Plane::Main, Access::Read)?;
    let info = *source.info();
    source.compute_row_hints(0, info.height);

    let hints: Vec<RowHint> = (0..info.height)
        .map(|y| match source.row_hint(y) {
            _ if opacity == 0 => RowHint::Transparent,
            RowHint::Opaque if opacity < 255 => RowHint::Mixed,
            hint => hint,
        })
        .collect();

    let mut report = CompositeReport::default();
    if hints.iter().all(|&hint| hint == RowHint::Transparent) {
        report.rows_skipped = hints.len();
        return Ok(report);
    }

    let mut target = dst.acquire(row, col, Plane::Main, Access::Write)?;
    let src_data = source.pixels();
    let mut dst_data = target.pixels_mut()?;
    let rowstride = info.rowstride();

    let rows = src_data
        .chunks_exact(rowstride)
        .zip(dst_data.chunks_exact_mut(rowstride));
    for ((src_row, dst_row), hint) in rows.zip(hints) {
        match hint {
            RowHint::Transparent => report.rows_skipped += 1,
            RowHint::Opaque => {
                dst_row.copy_from_slice(src_row);
                report.rows_copied += 1;
            }
            RowHint::Mixed | RowHint::Unknown => {
                blend_row(src_row, dst_row, info.format, opacity);
                report.rows_blended += 1;
            }
        }
    }
    Ok(report)
}

/// Blend one packed row of `src` over `dst` with `opacity` in `0..=255`.
fn blend_row(src: &[u8], dst: &mut [u8], format: PixelFormat, opacity: u32) {
    let bpp = format.bytes_per_pixel();
    let pixels = src.chunks_exact(bpp).zip(dst.chunks_exact_mut(bpp));

    let Some(alpha) = format.alpha_index() else {
        for (s, d) in pixels {
            for (dc, &sc) in d.iter_mut().zip(s) {
                *dc = div_255(sc as u32 * opacity + *dc as u32 * (255 - opacity)) as u8;
            }
        }
        return;
    };

    for (s, d) in pixels {
        let sa = div_255(s[alpha] as u32 * opacity);
        if sa == 0 {
            continue;
        }
        let da = d[alpha] as u32;
        // Destination coverage left visible, scaled by 255.
        let under = da * (255 - sa);
        let total = sa * 255 + under;

        for (dc, &sc) in d[..alpha].iter_mut().zip(&s[..alpha]) {
            let value = sc as u32 * sa * 255 + *dc as u32 * under;
            *dc = ((value + total / 2) / total) as u8;
        }
        d[alpha] = div_255(total) as u8;
    }
}

fn div_255(value: u32) -> u32 {
    (value + 127) / 255
}
