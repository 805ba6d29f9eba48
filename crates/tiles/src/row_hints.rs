//! Per-scanline opacity classification
//!
//! Each tile can carry a table of row hints describing the alpha content of
//! every row. Compositors and resamplers use the hints to skip rows that are
//! fully transparent, or to copy rows that are fully opaque, without testing
//! every pixel.

use crate::format::PixelFormat;

/// Classification of one tile row's alpha channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowHint {
    /// Not computed, or invalidated by a write
    #[default]
    Unknown,
    /// Every pixel has alpha 255, or the format has no alpha
    Opaque,
    /// Every pixel has alpha 0
    Transparent,
    /// Anything else
    Mixed,
}

/// Classifies one packed row of pixels.
///
/// Formats without alpha are opaque unconditionally. Otherwise the first
/// pixel's alpha decides: partial alpha short-circuits to `Mixed`, and a 0 or
/// 255 alpha is confirmed by scanning the rest of the row.
pub fn classify_row(row: &[u8], format: PixelFormat) -> RowHint {
    let Some(alpha_index) = format.alpha_index() else {
        return RowHint::Opaque;
    };
    let bpp = format.bytes_per_pixel();

    let Some(&first) = row.get(alpha_index) else {
        return RowHint::Unknown;
    };

    if first != 0 && first != 255 {
        return RowHint::Mixed;
    }

    let uniform = row
        .chunks_exact(bpp)
        .skip(1)
        .all(|pixel| pixel[alpha_index] == first);

    match (uniform, first) {
        (false, _) => RowHint::Mixed,
        (true, 0) => RowHint::Transparent,
        (true, _) => RowHint::Opaque,
    }
}

/// Row hints for every scanline of a tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHintTable {
    hints: Vec<RowHint>,
}

impl RowHintTable {
    /// Create a table of `rows` unknown hints
    pub fn new(rows: usize) -> Self {
        Self {
            hints: vec![RowHint::Unknown; rows],
        }
    }

    /// Number of rows covered by the table
    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// Hint for row `y`; rows outside the table are `Unknown`.
    pub fn get(&self, y: usize) -> RowHint {
        self.hints.get(y).copied().unwrap_or_default()
    }

    /// Set the hint for row `y`. Out-of-range rows are ignored.
    pub fn set(&mut self, y: usize, hint: RowHint) {
        if let Some(slot) = self.hints.get_mut(y) {
            *slot = hint;
        }
    }

    /// Reset every row to `Unknown`.
    pub fn invalidate(&mut self) {
        self.hints.fill(RowHint::Unknown);
    }

    /// Reset `count` rows starting at `start` to `Unknown`.
    pub fn invalidate_rows(&mut self, start: usize, count: usize) {
        let start = start.min(self.hints.len());
        let end = start.saturating_add(count).min(self.hints.len());
        self.hints[start..end].fill(RowHint::Unknown);
    }

    /// Classify rows `start..start + count` of `data`.
    ///
    /// `data` is the tile's packed pixel buffer with rows of `width` pixels.
    /// Rows that already carry a hint are left alone.
    pub fn compute(
        &mut self,
        data: &[u8],
        width: usize,
        format: PixelFormat,
        start: usize,
        count: usize,
    ) {
        let stride = width * format.bytes_per_pixel();
        if stride == 0 {
            return;
        }

        let rows = data.chunks_exact(stride).enumerate().skip(start).take(count);
        for (y, row) in rows {
            let Some(hint) = self.hints.get_mut(y) else {
                break;
            };
            if *hint == RowHint::Unknown {
                *hint = classify_row(row, format);
            }
        }
    }

    /// Iterate over the hints in row order
    pub fn iter(&self) -> impl Iterator<Item = RowHint> + '_ {
        self.hints.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn rgba_row(alphas: &[u8]) -> Vec<u8> {
        alphas.iter().flat_map(|&a| [10, 20, 30, a]).collect()
    }

    #[test]
    fn test_no_alpha_is_always_opaque() {
        assert_eq!(classify_row(&[0, 0, 0], PixelFormat::Gray), RowHint::Opaque);
        assert_eq!(classify_row(&[1, 2, 3, 4, 5, 6], PixelFormat::Rgb), RowHint::Opaque);
    }

    #[test]
    fn test_uniform_rows() {
        assert_eq!(
            classify_row(&rgba_row(&[0, 0, 0]), PixelFormat::RgbAlpha),
            RowHint::Transparent
        );
        assert_eq!(
            classify_row(&rgba_row(&[255, 255]), PixelFormat::RgbAlpha),
            RowHint::Opaque
        );
        assert_eq!(
            classify_row(&[7, 255, 9, 255], PixelFormat::GrayAlpha),
            RowHint::Opaque
        );
    }

    #[test]
    fn test_mixed_rows() {
        assert_eq!(
            classify_row(&rgba_row(&[0, 255]), PixelFormat::RgbAlpha),
            RowHint::Mixed
        );
        // Partial alpha in the first pixel short-circuits.
        assert_eq!(
            classify_row(&rgba_row(&[128, 128]), PixelFormat::RgbAlpha),
            RowHint::Mixed
        );
        assert_eq!(
            classify_row(&rgba_row(&[255, 255, 254]), PixelFormat::RgbAlpha),
            RowHint::Mixed
        );
    }

    #[test]
    fn test_single_pixel_row() {
        assert_eq!(classify_row(&rgba_row(&[0]), PixelFormat::RgbAlpha), RowHint::Transparent);
        assert_eq!(classify_row(&[3, 255], PixelFormat::GrayAlpha), RowHint::Opaque);
    }

    #[test]
    fn test_compute_only_fills_unknown_rows() {
        let width = 2;
        let mut data = rgba_row(&[0, 0]);
        data.extend(rgba_row(&[255, 255]));
        data.extend(rgba_row(&[0, 255]));

        let mut table = RowHintTable::new(3);
        table.set(0, RowHint::Mixed);
        table.compute(&data, width, PixelFormat::RgbAlpha, 0, 3);

        assert_eq!(table.get(0), RowHint::Mixed);
        assert_eq!(table.get(1), RowHint::Opaque);
        assert_eq!(table.get(2), RowHint::Mixed);
    }

    #[test]
    fn test_compute_respects_row_range() {
        let data = rgba_row(&[0; 4 * 4]);
        let mut table = RowHintTable::new(4);
        table.compute(&data, 4, PixelFormat::RgbAlpha, 1, 2);

        let hints: Vec<_> = table.iter().collect();
        assert_eq!(
            hints,
            vec![
                RowHint::Unknown,
                RowHint::Transparent,
                RowHint::Transparent,
                RowHint::Unknown
            ]
        );
    }

    #[test]
    fn test_invalidate_rows() {
        let data = rgba_row(&[255; 3 * 3]);
        let mut table = RowHintTable::new(3);
        table.compute(&data, 3, PixelFormat::RgbAlpha, 0, 3);
        table.invalidate_rows(1, 10);

        assert_eq!(table.get(0), RowHint::Opaque);
        assert_eq!(table.get(1), RowHint::Unknown);
        assert_eq!(table.get(2), RowHint::Unknown);

        table.invalidate();
        assert!(table.iter().all(|hint| hint == RowHint::Unknown));
    }

    #[test]
    fn test_out_of_range_access() {
        let mut table = RowHintTable::new(2);
        table.set(5, RowHint::Opaque);
        assert_eq!(table.get(5), RowHint::Unknown);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_random_alpha_patterns_agree_with_full_scan() {
        let mut rng = StdRng::seed_from_u64(0x7e55e7a);

        for format in [PixelFormat::GrayAlpha, PixelFormat::RgbAlpha] {
            let bpp = format.bytes_per_pixel();
            for _ in 0..200 {
                let width = rng.gen_range(1..=64);
                let height = rng.gen_range(1..=64);
                let mut data = vec![0u8; width * height * bpp];

                for row in data.chunks_exact_mut(width * bpp) {
                    // Bias towards uniform rows so every class shows up.
                    let choice: u8 = rng.gen_range(0..4);
                    for pixel in row.chunks_exact_mut(bpp) {
                        pixel[bpp - 1] = match choice {
                            0 => 0,
                            1 => 255,
                            2 => {
                                if rng.gen_bool(0.5) {
                                    0
                                } else {
                                    255
                                }
                            }
                            _ => rng.gen(),
                        };
                    }
                }

                let mut table = RowHintTable::new(height);
                table.compute(&data, width, format, 0, height);

                for (y, row) in data.chunks_exact(width * bpp).enumerate() {
                    let alphas: Vec<u8> =
                        row.chunks_exact(bpp).map(|pixel| pixel[bpp - 1]).collect();
                    let expected = if alphas.iter().all(|&a| a == 255) {
                        RowHint::Opaque
                    } else if alphas.iter().all(|&a| a == 0) {
                        RowHint::Transparent
                    } else {
                        RowHint::Mixed
                    };
                    assert_eq!(table.get(y), expected, "row {} of {:?}", y, format);
                }
            }
        }
    }
}
