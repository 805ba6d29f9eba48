//! Tile grids for one drawable
//!
//! A [`TileManager`] splits a `width x height` drawable into a grid of
//! `tile_size` tiles, row-major, with reduced effective sizes along the right
//! and bottom edges. Besides the main grid it can carry a shadow grid of the
//! same shape that edits are staged into before being committed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::cache::TileCache;
use crate::error::TileError;
use crate::format::PixelFormat;
use crate::tile::{
    Access, ManagerId, Plane, Tile, TileContext, TileGuard, TileInfo, TileKey, WriteBack,
};

/// Fills a tile with content the first time it is referenced.
///
/// `data` is zeroed and holds `info.width * info.height` packed pixels.
/// Returning an error aborts the reference; the tile stays invalid and the
/// validator runs again on the next reference.
pub trait TileValidator: Send + Sync {
    fn validate(&self, info: &TileInfo, data: &mut [u8]) -> Result<(), TileError>;
}

impl<F> TileValidator for F
where
    F: Fn(&TileInfo, &mut [u8]) -> Result<(), TileError> + Send + Sync,
{
    fn validate(&self, info: &TileInfo, data: &mut [u8]) -> Result<(), TileError> {
        self(info, data)
    }
}

struct Grid {
    tiles: Vec<Arc<Tile>>,
    rows: u32,
    cols: u32,
    width: u32,
    height: u32,
    tile_size: u32,
    format: PixelFormat,
}

impl Grid {
    fn get(&self, row: u32, col: u32) -> Result<&Arc<Tile>, TileError> {
        let out_of_bounds = TileError::OutOfBounds {
            row,
            col,
            rows: self.rows,
            cols: self.cols,
        };
        if row >= self.rows || col >= self.cols {
            return Err(out_of_bounds);
        }
        self.tiles
            .get(row as usize * self.cols as usize + col as usize)
            .ok_or(out_of_bounds)
    }

    fn check_region(&self, x: u32, y: u32, width: u32, height: u32, len: usize) -> Result<(), TileError> {
        if u64::from(x) + u64::from(width) > u64::from(self.width)
            || u64::from(y) + u64::from(height) > u64::from(self.height)
        {
            return Err(TileError::RegionOutOfBounds {
                x,
                y,
                width,
                height,
                max_width: self.width,
                max_height: self.height,
            });
        }
        let expected = width as usize * height as usize * self.format.bytes_per_pixel();
        if len != expected {
            return Err(TileError::BufferSize {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Visit every tile overlapping the rectangle, with the overlap in
    /// drawable coordinates as `(x0, y0, x1, y1)`.
    fn for_each_overlap<F>(&self, x: u32, y: u32, width: u32, height: u32, mut f: F) -> Result<(), TileError>
    where
        F: FnMut(&Tile, (u32, u32, u32, u32)) -> Result<(), TileError>,
    {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let ts = self.tile_size;
        for row in y / ts..=(y + height - 1) / ts {
            for col in x / ts..=(x + width - 1) / ts {
                let tile = self.get(row, col)?;
                let info = tile.info();
                let x0 = x.max(info.x);
                let y0 = y.max(info.y);
                let x1 = (x + width).min(info.x + info.width);
                let y1 = (y + height).min(info.y + info.height);
                f(tile, (x0, y0, x1, y1))?;
            }
        }
        Ok(())
    }

    fn read_rect(&self, x: u32, y: u32, width: u32, height: u32, buf: &mut [u8]) -> Result<(), TileError> {
        self.check_region(x, y, width, height, buf.len())?;
        let bpp = self.format.bytes_per_pixel();
        let stride = width as usize * bpp;

        self.for_each_overlap(x, y, width, height, |tile, (x0, y0, x1, y1)| {
            let guard = tile.reference(Access::Read)?;
            let info = tile.info();
            let data = guard.pixels();
            let span = (x1 - x0) as usize * bpp;
            for py in y0..y1 {
                let src = (py - info.y) as usize * info.rowstride() + (x0 - info.x) as usize * bpp;
                let dst = (py - y) as usize * stride + (x0 - x) as usize * bpp;
                buf[dst..dst + span].copy_from_slice(&data[src..src + span]);
            }
            Ok(())
        })
    }

    fn write_rect(&self, x: u32, y: u32, width: u32, height: u32, src: &[u8]) -> Result<(), TileError> {
        self.check_region(x, y, width, height, src.len())?;
        let bpp = self.format.bytes_per_pixel();
        let stride = width as usize * bpp;

        self.for_each_overlap(x, y, width, height, |tile, (x0, y0, x1, y1)| {
            let mut guard = tile.reference(Access::Write)?;
            let info = *tile.info();
            let mut data = guard.pixels_mut()?;
            let span = (x1 - x0) as usize * bpp;
            for py in y0..y1 {
                let dst = (py - info.y) as usize * info.rowstride() + (x0 - info.x) as usize * bpp;
                let from = (py - y) as usize * stride + (x0 - x) as usize * bpp;
                data[dst..dst + span].copy_from_slice(&src[from..from + span]);
            }
            Ok(())
        })
    }

    fn iter(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.tiles.iter().map(|tile| tile.as_ref())
    }

    fn destroy(&self) {
        for tile in &self.tiles {
            tile.destroy();
        }
    }
}

/// Owns the tile grid of one drawable.
///
/// Guards returned by [`acquire`](TileManager::acquire) and
/// [`Tile::reference`] borrow the manager, so it cannot be resized or
/// dropped while a reference is outstanding.
pub struct TileManager {
    id: ManagerId,
    width: u32,
    height: u32,
    format: PixelFormat,
    tile_size: u32,
    ctx: Arc<TileContext>,
    validator: Option<Arc<dyn TileValidator>>,
    main: OnceLock<Grid>,
    shadow: OnceLock<Grid>,
}

impl TileManager {
    /// Create a manager whose tiles are zero-filled on first reference.
    pub fn new(cache: Arc<TileCache>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self::build(cache, width, height, format, None)
    }

    /// Create a manager whose main tiles are filled by `validator`.
    pub fn with_validator<V>(
        cache: Arc<TileCache>,
        width: u32,
        height: u32,
        format: PixelFormat,
        validator: V,
    ) -> Self
    where
        V: TileValidator + 'static,
    {
        Self::build(cache, width, height, format, Some(Arc::new(validator)))
    }

    fn build(
        cache: Arc<TileCache>,
        width: u32,
        height: u32,
        format: PixelFormat,
        validator: Option<Arc<dyn TileValidator>>,
    ) -> Self {
        Self {
            id: cache.next_manager_id(),
            width,
            height,
            format,
            tile_size: cache.tile_size(),
            ctx: Arc::new(TileContext {
                cache,
                degraded: AtomicUsize::new(0),
            }),
            validator,
            main: OnceLock::new(),
            shadow: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.ctx.cache
    }

    /// Number of tile rows, `ceil(height / tile_size)`
    pub fn rows(&self) -> u32 {
        self.height.div_ceil(self.tile_size)
    }

    /// Number of tile columns, `ceil(width / tile_size)`
    pub fn cols(&self) -> u32 {
        self.width.div_ceil(self.tile_size)
    }

    pub fn tile_count(&self) -> usize {
        self.rows() as usize * self.cols() as usize
    }

    fn tile_info(&self, row: u32, col: u32, plane: Plane) -> TileInfo {
        let ts = self.tile_size;
        let x = col * ts;
        let y = row * ts;
        TileInfo {
            key: TileKey {
                manager: self.id,
                serial: 0,
            },
            plane,
            row,
            col,
            x,
            y,
            width: (self.width - x).min(ts),
            height: (self.height - y).min(ts),
            format: self.format,
        }
    }

    /// Build a grid for the current geometry. `reuse` may hand back an
    /// existing tile for a position instead of a fresh one.
    fn build_grid<F>(&self, plane: Plane, mut reuse: F) -> Grid
    where
        F: FnMut(&TileInfo) -> Option<Arc<Tile>>,
    {
        let (rows, cols) = (self.rows(), self.cols());
        let validator = match plane {
            Plane::Main => self.validator.clone(),
            Plane::Shadow => None,
        };

        let mut tiles = Vec::with_capacity(rows as usize * cols as usize);
        for row in 0..rows {
            for col in 0..cols {
                let mut info = self.tile_info(row, col, plane);
                let tile = match reuse(&info) {
                    Some(tile) => tile,
                    None => {
                        info.key.serial = self.ctx.cache.next_serial();
                        Tile::new(info, self.ctx.clone(), validator.clone())
                    }
                };
                tiles.push(tile);
            }
        }

        Grid {
            tiles,
            rows,
            cols,
            width: self.width,
            height: self.height,
            tile_size: self.tile_size,
            format: self.format,
        }
    }

    fn grid(&self, plane: Plane) -> &Grid {
        let cell = match plane {
            Plane::Main => &self.main,
            Plane::Shadow => &self.shadow,
        };
        cell.get_or_init(|| self.build_grid(plane, |_| None))
    }

    /// Tile at grid position `(row, col)`.
    ///
    /// The grid's bookkeeping is created on first access; pixel buffers are
    /// only allocated when a tile is referenced.
    pub fn get_tile(&self, row: u32, col: u32, plane: Plane) -> Result<&Tile, TileError> {
        self.grid(plane).get(row, col).map(|tile| tile.as_ref())
    }

    /// Tile containing pixel `(x, y)`.
    pub fn get_tile_at(&self, x: u32, y: u32, plane: Plane) -> Result<&Tile, TileError> {
        let (row, col) = (y / self.tile_size, x / self.tile_size);
        if x >= self.width || y >= self.height {
            return Err(TileError::OutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.get_tile(row, col, plane)
    }

    /// Reference the tile at `(row, col)`.
    pub fn acquire(
        &self,
        row: u32,
        col: u32,
        plane: Plane,
        access: Access,
    ) -> Result<TileGuard<'_>, TileError> {
        self.get_tile(row, col, plane)?.reference(access)
    }

    /// Reference the tile containing pixel `(x, y)`.
    pub fn acquire_at(
        &self,
        x: u32,
        y: u32,
        plane: Plane,
        access: Access,
    ) -> Result<TileGuard<'_>, TileError> {
        self.get_tile_at(x, y, plane)?.reference(access)
    }

    /// Copy a rectangle of pixels into `buf`, packed with `width * bpp` bytes
    /// per row.
    pub fn read_pixel_data(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        plane: Plane,
        buf: &mut [u8],
    ) -> Result<(), TileError> {
        self.grid(plane).read_rect(x, y, width, height, buf)
    }

    /// Copy packed pixels from `data` into a rectangle of the drawable.
    pub fn write_pixel_data(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        plane: Plane,
        data: &[u8],
    ) -> Result<(), TileError> {
        self.grid(plane).write_rect(x, y, width, height, data)
    }

    pub fn read_pixel(&self, x: u32, y: u32, plane: Plane, out: &mut [u8]) -> Result<(), TileError> {
        let guard = self.acquire_at(x, y, plane, Access::Read)?;
        let info = guard.info();
        guard.read_pixel(x - info.x, y - info.y, out)
    }

    pub fn write_pixel(&self, x: u32, y: u32, plane: Plane, pixel: &[u8]) -> Result<(), TileError> {
        let mut guard = self.acquire_at(x, y, plane, Access::Write)?;
        let info = *guard.info();
        guard.write_pixel(x - info.x, y - info.y, pixel)
    }

    fn grids(&self) -> impl Iterator<Item = &Grid> + '_ {
        self.main.get().into_iter().chain(self.shadow.get())
    }

    /// Tiles of one plane, empty if the plane was never accessed.
    pub fn tiles(&self, plane: Plane) -> impl Iterator<Item = &Tile> + '_ {
        let grid = match plane {
            Plane::Main => self.main.get(),
            Plane::Shadow => self.shadow.get(),
        };
        grid.into_iter().flat_map(|grid| grid.iter())
    }

    /// Write every dirty resident tile to swap, then evict this manager's
    /// unreferenced tiles.
    ///
    /// Tiles whose pixels are being written at the time are skipped and stay
    /// dirty. Every tile is attempted; the first failure is returned.
    ///
    /// Returns the number of tiles written.
    pub fn flush(&self) -> Result<usize, TileError> {
        let mut written = 0;
        let mut first_error = None;

        for tile in self.grids().flat_map(|grid| grid.iter()) {
            match tile.write_back() {
                Ok(WriteBack::Written) => written += 1,
                Ok(WriteBack::Clean) => {}
                Ok(WriteBack::Busy) => {
                    log::trace!("tile ({}, {}) busy during flush", tile.info().row, tile.info().col)
                }
                Err(err) => {
                    log::warn!(
                        "flush of tile ({}, {}) failed: {}",
                        tile.info().row,
                        tile.info().col,
                        err
                    );
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        self.ctx.cache.evict_manager(self.id);
        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// Discard a tile's content so the validator runs again on its next
    /// reference.
    ///
    /// # Errors
    /// `Referenced` if the tile is in use.
    pub fn invalidate_tile(&self, row: u32, col: u32, plane: Plane) -> Result<(), TileError> {
        self.get_tile(row, col, plane)?.reset()
    }

    pub fn has_shadow(&self) -> bool {
        self.shadow.get().is_some()
    }

    /// Discard the shadow grid and its swap storage.
    pub fn drop_shadow(&mut self) {
        if let Some(shadow) = self.shadow.take() {
            shadow.destroy();
        }
    }

    /// Copy every materialized shadow tile over the main tile at the same
    /// position, then drop the shadow. Returns the number of tiles copied.
    pub fn commit_shadow(&mut self) -> Result<usize, TileError> {
        let Some(shadow) = self.shadow.get() else {
            return Ok(0);
        };

        let mut committed = 0;
        for tile in shadow.iter() {
            if !tile.is_valid() {
                continue;
            }
            let info = tile.info();
            let src = tile.reference(Access::Read)?;
            let mut dst = self.acquire(info.row, info.col, Plane::Main, Access::Write)?;
            dst.pixels_mut()?.copy_from_slice(&src.pixels());
            committed += 1;
        }

        log::debug!("committed {} shadow tiles of manager {}", committed, self.id.get());
        self.drop_shadow();
        Ok(committed)
    }

    /// Change the drawable size. The old content lands at
    /// `(offset_x, offset_y)` in the new drawable; anything outside the new
    /// bounds is discarded.
    ///
    /// With a zero offset tiles whose effective size did not change are kept
    /// as they are. Other overlapping tiles are filled by copying. Every tile
    /// is attempted and the new grid is installed even if copying fails; the
    /// first failure is returned. The shadow is discarded.
    pub fn resize(
        &mut self,
        width: u32,
        height: u32,
        offset_x: i64,
        offset_y: i64,
    ) -> Result<(), TileError> {
        self.drop_shadow();
        let old = self.main.take();
        let (old_width, old_height) = (self.width, self.height);
        self.width = width;
        self.height = height;

        let Some(old) = old else {
            log::debug!("resized untouched manager {} to {}x{}", self.id.get(), width, height);
            return Ok(());
        };

        let in_place = offset_x == 0 && offset_y == 0;
        let mut reused = vec![false; old.tiles.len()];
        let grid = self.build_grid(Plane::Main, |info| {
            if !in_place {
                return None;
            }
            let tile = old.get(info.row, info.col).ok()?;
            if tile.width() != info.width || tile.height() != info.height {
                return None;
            }
            let index = info.row as usize * old.cols as usize + info.col as usize;
            reused[index] = true;
            Some(tile.clone())
        });

        let mut first_error = None;
        let mut kept = 0;
        for tile in &grid.tiles {
            let info = tile.info();
            let is_kept = in_place
                && old
                    .get(info.row, info.col)
                    .is_ok_and(|old_tile| Arc::ptr_eq(old_tile, tile));
            if is_kept {
                kept += 1;
                continue;
            }
            let Some((x0, y0, x1, y1)) =
                overlap(info, offset_x, offset_y, old_width, old_height)
            else {
                continue;
            };

            let (w, h) = (x1 - x0, y1 - y0);
            let mut buf = vec![0; w as usize * h as usize * self.format.bytes_per_pixel()];
            let copied = old
                .read_rect(
                    (i64::from(x0) - offset_x) as u32,
                    (i64::from(y0) - offset_y) as u32,
                    w,
                    h,
                    &mut buf,
                )
                .and_then(|()| grid.write_rect(x0, y0, w, h, &buf));
            if let Err(err) = copied {
                log::warn!("resize lost tile ({}, {}): {}", info.row, info.col, err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        for (tile, reused) in old.tiles.iter().zip(&reused) {
            if !reused {
                tile.destroy();
            }
        }

        log::debug!(
            "resized manager {} from {}x{} to {}x{} at ({}, {}), kept {} tiles",
            self.id.get(),
            old_width,
            old_height,
            width,
            height,
            offset_x,
            offset_y,
            kept
        );
        self.main = OnceLock::from(grid);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Bytes of pixel data currently resident for this manager
    pub fn memsize(&self) -> usize {
        self.grids()
            .flat_map(|grid| grid.iter())
            .filter(|tile| tile.is_resident())
            .map(Tile::size)
            .sum()
    }

    /// Sum of the reference counts of every tile
    pub fn outstanding_references(&self) -> u32 {
        self.grids().flat_map(|grid| grid.iter()).map(Tile::ref_count).sum()
    }

    /// Number of swap-ins that failed and were replaced by zeroes
    pub fn degraded_tiles(&self) -> usize {
        self.ctx.degraded.load(Ordering::Relaxed)
    }
}

/// Part of the new tile `info` covered by old content placed at
/// `(offset_x, offset_y)`, in new drawable coordinates.
fn overlap(
    info: &TileInfo,
    offset_x: i64,
    offset_y: i64,
    old_width: u32,
    old_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let x0 = i64::from(info.x).max(offset_x);
    let y0 = i64::from(info.y).max(offset_y);
    let x1 = i64::from(info.x + info.width).min(offset_x + i64::from(old_width));
    let y1 = i64::from(info.y + info.height).min(offset_y + i64::from(old_height));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

impl Drop for TileManager {
    fn drop(&mut self) {
        self.ctx.cache.flush_manager(self.id);
        for grid in self.grids() {
            grid.destroy();
        }
    }
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("tile_size", &self.tile_size)
            .field("has_shadow", &self.has_shadow())
            .finish()
    }
}
