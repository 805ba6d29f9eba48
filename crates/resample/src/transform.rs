//! Geometric transforms of tiled drawables
//!
//! Every destination pixel center is mapped back through the inverse matrix
//! and the source is sampled there. Destination tile rows run in parallel on
//! the rayon pool; each worker keeps its last source tile referenced so that
//! neighbouring samples do not go back through the cache.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tessera_tiles::{Access, PixelFormat, Plane, TileError, TileGuard, TileManager};
use tessera_transform::{transform_bounds, Matrix3};

use crate::cancel::CancellationToken;
use crate::error::ResampleError;
use crate::progress::ProgressSink;

/// Source sampling filter. Every filter except `Nearest` weights colors by
/// alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Nearest source pixel
    Nearest,
    /// Bilinear over the 2x2 nearest pixels
    #[default]
    Linear,
    /// Catmull-Rom over the 4x4 nearest pixels. Overshoot is clamped.
    Cubic,
    /// Three-lobe Lanczos window over the 6x6 nearest pixels
    Lanczos,
}

impl Interpolation {
    /// Pixels the filter reaches on each side of the sample point
    fn radius(self) -> i64 {
        match self {
            Interpolation::Nearest | Interpolation::Linear => 1,
            Interpolation::Cubic => 2,
            Interpolation::Lanczos => 3,
        }
    }

    fn weight(self, distance: f64) -> f64 {
        let d = distance.abs();
        match self {
            Interpolation::Nearest => {
                if d < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Interpolation::Linear => (1.0 - d).max(0.0),
            Interpolation::Cubic => catmull_rom(d),
            Interpolation::Lanczos => lanczos3(d),
        }
    }
}

fn catmull_rom(d: f64) -> f64 {
    if d < 1.0 {
        (1.5 * d - 2.5) * d * d + 1.0
    } else if d < 2.0 {
        ((-0.5 * d + 2.5) * d - 4.0) * d + 2.0
    } else {
        0.0
    }
}

fn lanczos3(d: f64) -> f64 {
    if d == 0.0 {
        1.0
    } else if d < 3.0 {
        let x = std::f64::consts::PI * d;
        3.0 * x.sin() * (x / 3.0).sin() / (x * x)
    } else {
        0.0
    }
}

/// Widest filter footprint along one axis
const MAX_TAPS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformOptions {
    pub interpolation: Interpolation,
    /// Fill for destination pixels that map outside the source. Only used
    /// for formats without alpha; alpha formats get transparent pixels.
    pub background: [u8; 4],
    /// Image coordinates of the destination drawable's top-left pixel.
    pub dest_origin: (i64, i64),
    /// Average several bilinear samples where a destination pixel covers
    /// more than one source pixel along an edge.
    pub supersample: bool,
    /// How many times a destination pixel may be split into quarters when
    /// supersampling; up to `4^recursion_level` samples per pixel.
    pub recursion_level: u32,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::default(),
            background: [0, 0, 0, 255],
            dest_origin: (0, 0),
            supersample: false,
            recursion_level: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformReport {
    /// Destination tiles written, background-only tiles included
    pub tiles_written: usize,
    /// Destination tiles that lie entirely outside the transformed source
    pub tiles_outside_source: usize,
    /// Source tile references that faulted in zeroes after a swap failure
    pub degraded_tiles: usize,
}

/// Resample the main plane of `src` into `dst_plane` of `dst`.
///
/// `matrix` maps source image coordinates to destination image
/// coordinates. Progress is reported after each destination tile row and
/// `cancel` is polled before each one; tiles finished before cancellation
/// keep their new contents.
///
/// # Errors
/// `FormatMismatch` and `SingularMatrix` are checked before any tile is
/// touched. Writing the source's own main plane is refused with `InPlace`.
/// Tile errors from either drawable abort the operation.
pub fn transform_tiles(
    src: &TileManager,
    dst: &TileManager,
    dst_plane: Plane,
    matrix: &Matrix3,
    options: &TransformOptions,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<TransformReport, ResampleError> {
    if src.format() != dst.format() {
        return Err(ResampleError::FormatMismatch {
            src: src.format(),
            dst: dst.format(),
        });
    }
    if src.id() == dst.id() && dst_plane == Plane::Main {
        return Err(ResampleError::InPlace);
    }
    let inverse = matrix.invert().ok_or(ResampleError::SingularMatrix)?;

    let interpolation = if matrix.is_simple() {
        Interpolation::Nearest
    } else {
        options.interpolation
    };
    let job = Job {
        src,
        dst,
        dst_plane,
        inverse,
        interpolation,
        background: background_pixel(src.format(), options.background),
        origin: options.dest_origin,
        supersample: options.supersample && interpolation != Interpolation::Nearest,
        recursion_level: options.recursion_level,
    };

    log::debug!(
        "transforming {}x{} {:?} into {}x{} ({:?}, {:?})",
        src.width(),
        src.height(),
        src.format(),
        dst.width(),
        dst.height(),
        dst_plane,
        interpolation
    );

    let rows = dst.rows();
    let completed = AtomicUsize::new(0);
    let outside = AtomicUsize::new(0);
    let degraded = AtomicUsize::new(0);

    (0..rows).into_par_iter().try_for_each(|row| {
        cancel.check()?;

        let mut sampler = Sampler::new(src);
        for col in 0..dst.cols() {
            if job.transform_tile(row, col, &mut sampler)? {
                outside.fetch_add(1, Ordering::Relaxed);
            }
        }
        degraded.fetch_add(sampler.degraded, Ordering::Relaxed);

        let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
        progress.set_fraction(done as f64 / rows as f64);
        Ok::<(), ResampleError>(())
    })?;

    let report = TransformReport {
        tiles_written: dst.tile_count(),
        tiles_outside_source: outside.into_inner(),
        degraded_tiles: degraded.into_inner(),
    };
    if report.degraded_tiles > 0 {
        log::warn!(
            "transform read {} zero-filled source tiles",
            report.degraded_tiles
        );
    }
    Ok(report)
}

fn background_pixel(format: PixelFormat, background: [u8; 4]) -> [u8; 4] {
    if format.has_alpha() {
        [0; 4]
    } else {
        background
    }
}

struct Job<'a> {
    src: &'a TileManager,
    dst: &'a TileManager,
    dst_plane: Plane,
    inverse: Matrix3,
    interpolation: Interpolation,
    background: [u8; 4],
    origin: (i64, i64),
    supersample: bool,
    recursion_level: u32,
}

type Point = (f64, f64);

impl Job<'_> {
    /// Fill one destination tile. Returns true if it only got background.
    fn transform_tile(
        &self,
        row: u32,
        col: u32,
        sampler: &mut Sampler<'_>,
    ) -> Result<bool, ResampleError> {
        let mut guard = self.dst.acquire(row, col, self.dst_plane, Access::Write)?;
        let info = *guard.info();
        let bpp = info.format.bytes_per_pixel();
        let left = self.origin.0 + info.x as i64;
        let top = self.origin.1 + info.y as i64;

        let outside = self.is_outside_source(left, top, info.width, info.height);
        let mut data = guard.pixels_mut()?;

        if outside {
            for pixel in data.chunks_exact_mut(bpp) {
                pixel.copy_from_slice(&self.background[..bpp]);
            }
            return Ok(true);
        }

        for (y, line) in data.chunks_exact_mut(info.rowstride()).enumerate() {
            let cy = (top + y as i64) as f64 + 0.5;
            for (x, pixel) in line.chunks_exact_mut(bpp).enumerate() {
                let cx = (left + x as i64) as f64 + 0.5;
                let sample = self.sample(sampler, cx, cy)?;
                pixel.copy_from_slice(&sample[..bpp]);
            }
        }
        Ok(false)
    }

    /// Cheap rejection for affine maps: the tile's preimage misses the source.
    fn is_outside_source(&self, left: i64, top: i64, width: u32, height: u32) -> bool {
        if !self.inverse.is_affine() {
            return false;
        }
        let (min_x, min_y, max_x, max_y) = transform_bounds(
            &self.inverse,
            left as f64,
            top as f64,
            (left + width as i64) as f64,
            (top + height as i64) as f64,
        );
        // Slack for the filter footprint.
        let slack = self.interpolation.radius() as f64;
        max_x < -slack
            || max_y < -slack
            || min_x > self.src.width() as f64 + slack
            || min_y > self.src.height() as f64 + slack
    }

    /// Value of the destination pixel centered at `(cx, cy)`.
    fn sample(&self, sampler: &mut Sampler<'_>, cx: f64, cy: f64) -> Result<[u8; 4], TileError> {
        let Some((sx, sy)) = map_point(&self.inverse, cx, cy) else {
            return Ok(self.background);
        };
        if self.supersample {
            if let Some(quad) = self.pixel_quad(cx, cy) {
                if spans_pixels(&quad) {
                    return self.supersampled(sampler, (sx, sy), quad);
                }
            }
        }
        match self.interpolation {
            Interpolation::Nearest => self.nearest(sampler, sx, sy),
            filter => self.filtered(sampler, filter, sx, sy),
        }
    }

    /// Source-space corners of the destination pixel centered at `(cx, cy)`,
    /// in order around the pixel.
    fn pixel_quad(&self, cx: f64, cy: f64) -> Option<[Point; 4]> {
        let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
        let mut quad = [(0.0, 0.0); 4];
        for (point, (dx, dy)) in quad.iter_mut().zip(corners) {
            *point = map_point(&self.inverse, cx + dx, cy + dy)?;
        }
        Some(quad)
    }

    fn supersampled(
        &self,
        sampler: &mut Sampler<'_>,
        center: Point,
        quad: [Point; 4],
    ) -> Result<[u8; 4], TileError> {
        let mut sum = Accumulator::default();
        self.subdivide(sampler, center, quad, self.recursion_level, &mut sum)?;
        Ok(sum.finish(self.src.format()))
    }

    /// Split `quad` into quarters until no edge spans more than a source
    /// pixel or `level` runs out, taking one bilinear sample per leaf.
    fn subdivide(
        &self,
        sampler: &mut Sampler<'_>,
        center: Point,
        quad: [Point; 4],
        level: u32,
        sum: &mut Accumulator,
    ) -> Result<(), TileError> {
        if level == 0 || !spans_pixels(&quad) {
            let pixel = self.filtered(sampler, Interpolation::Linear, center.0, center.1)?;
            sum.add(&pixel, 1.0, self.src.format());
            return Ok(());
        }

        let [q0, q1, q2, q3] = quad;
        let (top, right) = (midpoint(q0, q1), midpoint(q1, q2));
        let (bottom, left) = (midpoint(q2, q3), midpoint(q3, q0));
        let quarters = [
            [q0, top, center, left],
            [top, q1, right, center],
            [center, right, q2, bottom],
            [left, center, bottom, q3],
        ];
        for (corner, quarter) in quad.into_iter().zip(quarters) {
            self.subdivide(sampler, midpoint(corner, center), quarter, level - 1, sum)?;
        }
        Ok(())
    }

    fn nearest(
        &self,
        sampler: &mut Sampler<'_>,
        sx: f64,
        sy: f64,
    ) -> Result<[u8; 4], TileError> {
        let pixel = sampler.fetch(sx.floor() as i64, sy.floor() as i64)?;
        Ok(pixel.unwrap_or(self.background))
    }

    /// Separable filter around `(sx, sy)`, with taps outside the source
    /// taking the background.
    fn filtered(
        &self,
        sampler: &mut Sampler<'_>,
        filter: Interpolation,
        sx: f64,
        sy: f64,
    ) -> Result<[u8; 4], TileError> {
        let radius = filter.radius();
        let fx = sx - 0.5;
        let fy = sy - 0.5;
        let x0 = fx.floor() as i64 + 1 - radius;
        let y0 = fy.floor() as i64 + 1 - radius;
        let wx = tap_weights(filter, fx - fx.floor());
        let wy = tap_weights(filter, fy - fy.floor());
        let taps = 2 * radius as usize;

        let format = self.src.format();
        let mut sum = Accumulator::default();
        for (j, &row_weight) in wy[..taps].iter().enumerate() {
            for (i, &col_weight) in wx[..taps].iter().enumerate() {
                let weight = row_weight * col_weight;
                if weight == 0.0 {
                    continue;
                }
                let pixel = sampler
                    .fetch(x0 + i as i64, y0 + j as i64)?
                    .unwrap_or(self.background);
                sum.add(&pixel, weight, format);
            }
        }
        Ok(sum.finish(format))
    }
}

/// Normalized weights of the `2 * radius` taps starting `radius - 1`
/// pixels left of the sample, which lies `t` past the pixel center.
fn tap_weights(filter: Interpolation, t: f64) -> [f64; MAX_TAPS] {
    let radius = filter.radius();
    let mut weights = [0.0; MAX_TAPS];
    for (k, weight) in weights.iter_mut().take(2 * radius as usize).enumerate() {
        let offset = k as i64 + 1 - radius;
        *weight = filter.weight(t - offset as f64);
    }
    let total: f64 = weights.iter().sum();
    if total != 0.0 {
        for weight in &mut weights {
            *weight /= total;
        }
    }
    weights
}

/// Running alpha-weighted sum of source pixels
#[derive(Default)]
struct Accumulator {
    color: [f64; 3],
    coverage: f64,
    total: f64,
}

impl Accumulator {
    fn add(&mut self, pixel: &[u8; 4], weight: f64, format: PixelFormat) {
        let a = format
            .alpha_index()
            .map_or(1.0, |index| pixel[index] as f64 / 255.0);
        for (sum, &value) in self.color.iter_mut().zip(&pixel[..format.color_channels()]) {
            *sum += value as f64 * a * weight;
        }
        self.coverage += a * weight;
        self.total += weight;
    }

    fn finish(&self, format: PixelFormat) -> [u8; 4] {
        let channels = format.color_channels();
        let mut out = [0u8; 4];
        if self.coverage > 0.0 {
            for (dst, sum) in out.iter_mut().zip(self.color).take(channels) {
                *dst = to_byte(sum / self.coverage);
            }
        }
        if let Some(index) = format.alpha_index() {
            if self.total > 0.0 {
                out[index] = to_byte(self.coverage / self.total * 255.0);
            }
        }
        out
    }
}

fn midpoint(a: Point, b: Point) -> Point {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// True when an edge of `quad` is longer than a pixel along either axis.
fn spans_pixels(quad: &[Point; 4]) -> bool {
    (0..4).any(|i| {
        let (ax, ay) = quad[i];
        let (bx, by) = quad[(i + 1) % 4];
        (ax - bx).abs() > 1.0 || (ay - by).abs() > 1.0
    })
}

fn to_byte(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Apply the projective map, rejecting points at or beyond the horizon.
fn map_point(matrix: &Matrix3, x: f64, y: f64) -> Option<(f64, f64)> {
    let c = &matrix.coeff;
    let w = c[2][0] * x + c[2][1] * y + c[2][2];
    if w == 0.0 {
        return None;
    }
    let sx = (c[0][0] * x + c[0][1] * y + c[0][2]) / w;
    let sy = (c[1][0] * x + c[1][1] * y + c[1][2]) / w;
    (sx.is_finite() && sy.is_finite()).then_some((sx, sy))
}

/// Reads source pixels, holding a reference to the last tile touched.
struct Sampler<'a> {
    src: &'a TileManager,
    current: Option<TileGuard<'a>>,
    degraded: usize,
}

impl<'a> Sampler<'a> {
    fn new(src: &'a TileManager) -> Self {
        Self {
            src,
            current: None,
            degraded: 0,
        }
    }

    /// Pixel at source `(x, y)`, or `None` outside the drawable.
    fn fetch(&mut self, x: i64, y: i64) -> Result<Option<[u8; 4]>, TileError> {
        if x < 0 || y < 0 || x >= self.src.width() as i64 || y >= self.src.height() as i64 {
            return Ok(None);
        }
        let (x, y) = (x as u32, y as u32);
        let tile_size = self.src.tile_size();
        let (row, col) = (y / tile_size, x / tile_size);

        let guard = match self.current.take() {
            Some(guard) if guard.info().row == row && guard.info().col == col => guard,
            stale => {
                drop(stale);
                let guard = self.src.acquire(row, col, Plane::Main, Access::Read)?;
                if guard.is_degraded() {
                    self.degraded += 1;
                }
                guard
            }
        };
        let guard = self.current.insert(guard);

        let info = guard.info();
        let bpp = info.format.bytes_per_pixel();
        let offset = (y - info.y) as usize * info.rowstride() + (x - info.x) as usize * bpp;
        let mut pixel = [0u8; 4];
        pixel[..bpp].copy_from_slice(&guard.pixels()[offset..offset + bpp]);
        Ok(Some(pixel))
    }
}
