//! Tiles: the unit of memory residency and swap
//!
//! A tile's state is split over three locks that are always taken in the
//! same order: `meta`, then `pixels`, then `hints`. The cache only ever
//! `try_lock`s a tile while holding its own lock, so a tile holding `meta`
//! may call into the cache.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
    Weak,
};

use crate::cache::TileCache;
use crate::error::TileError;
use crate::format::PixelFormat;
use crate::manager::TileValidator;
use crate::row_hints::{RowHint, RowHintTable};
use crate::swap::SwapStore;

/// Identifies a tile manager within its cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(pub(crate) u64);

impl ManagerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Cache-wide identity of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub manager: ManagerId,
    pub serial: u64,
}

/// Which of a manager's two grids a tile belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Plane {
    #[default]
    Main,
    /// Staging copy for in-progress edits
    Shadow,
}

/// Kind of reference taken on a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn is_write(self) -> bool {
        self == Access::Write
    }
}

/// Geometry and identity of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileInfo {
    pub key: TileKey,
    pub plane: Plane,
    /// Grid row
    pub row: u32,
    /// Grid column
    pub col: u32,
    /// Pixel x of the tile's top-left corner in the drawable
    pub x: u32,
    /// Pixel y of the tile's top-left corner in the drawable
    pub y: u32,
    /// Effective width, smaller than the tile size at the right edge
    pub width: u32,
    /// Effective height, smaller than the tile size at the bottom edge
    pub height: u32,
    pub format: PixelFormat,
}

impl TileInfo {
    /// Bytes per row of pixel data
    pub fn rowstride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Size of the pixel buffer in bytes
    pub fn size(&self) -> usize {
        self.rowstride() * self.height as usize
    }
}

/// State shared by every tile of one manager
pub(crate) struct TileContext {
    pub(crate) cache: Arc<TileCache>,
    /// Tiles whose swap-in failed and were zero-filled
    pub(crate) degraded: AtomicUsize,
}

#[derive(Debug, Default)]
struct TileMeta {
    ref_count: u32,
    write_count: u32,
    dirty: bool,
    valid: bool,
    resident: bool,
    swap_offset: Option<u64>,
}

pub(crate) enum Eviction {
    Evicted { wrote: bool },
    Busy,
    Failed(TileError),
}

pub(crate) enum WriteBack {
    Written,
    Clean,
    Busy,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn alloc_zeroed(size: usize) -> Result<Vec<u8>, TileError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| TileError::OutOfMemory { bytes: size })?;
    buf.resize(size, 0);
    Ok(buf)
}

/// A rectangular block of one drawable's pixels.
///
/// Tiles are owned by their [`TileManager`](crate::TileManager). Pixel data
/// is only reachable through a [`TileGuard`] obtained from
/// [`reference`](Tile::reference); while any guard is alive the data is
/// resident.
pub struct Tile {
    info: TileInfo,
    ctx: Arc<TileContext>,
    validator: Option<Arc<dyn TileValidator>>,
    this: Weak<Tile>,
    meta: Mutex<TileMeta>,
    pixels: RwLock<Option<Vec<u8>>>,
    hints: Mutex<Option<RowHintTable>>,
}

impl Tile {
    pub(crate) fn new(
        info: TileInfo,
        ctx: Arc<TileContext>,
        validator: Option<Arc<dyn TileValidator>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Tile {
            info,
            ctx,
            validator,
            this: this.clone(),
            meta: Mutex::new(TileMeta::default()),
            pixels: RwLock::new(None),
            hints: Mutex::new(None),
        })
    }

    pub fn info(&self) -> &TileInfo {
        &self.info
    }

    pub fn key(&self) -> TileKey {
        self.info.key
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn format(&self) -> PixelFormat {
        self.info.format
    }

    /// Size of the pixel buffer in bytes
    pub fn size(&self) -> usize {
        self.info.size()
    }

    pub fn rowstride(&self) -> usize {
        self.info.rowstride()
    }

    pub fn ref_count(&self) -> u32 {
        lock(&self.meta).ref_count
    }

    pub fn write_ref_count(&self) -> u32 {
        lock(&self.meta).write_count
    }

    pub fn is_dirty(&self) -> bool {
        lock(&self.meta).dirty
    }

    /// Returns true once the tile holds real content
    pub fn is_valid(&self) -> bool {
        lock(&self.meta).valid
    }

    /// Returns true while the pixel buffer is in memory
    pub fn is_resident(&self) -> bool {
        lock(&self.meta).resident
    }

    /// Offset of the tile's copy in the swap file, if one was written
    pub fn swap_offset(&self) -> Option<u64> {
        lock(&self.meta).swap_offset
    }

    pub(crate) fn weak(&self) -> Weak<Tile> {
        self.this.clone()
    }

    pub(crate) fn swap(&self) -> &SwapStore {
        self.ctx.cache.swap()
    }

    /// Take a reference, faulting the pixel data in if needed.
    ///
    /// An invalid tile is filled by the manager's validator (or zeroed). A
    /// swapped-out tile is read back from swap; if that read fails the tile
    /// gets a zero-filled buffer and the error is carried on the guard.
    ///
    /// # Errors
    /// `OutOfMemory` if the buffer cannot be allocated, or the validator's
    /// error. The reference count is unchanged on error.
    pub fn reference(&self, access: Access) -> Result<TileGuard<'_>, TileError> {
        let mut meta = lock(&self.meta);
        let faulted = !meta.resident;
        let mut swap_error = None;

        if !meta.valid {
            self.validate(&mut meta)?;
        } else if !meta.resident {
            swap_error = self.swap_in(&mut meta)?;
        }

        meta.ref_count += 1;
        if access.is_write() {
            meta.write_count += 1;
        }
        drop(meta);

        let cache = &self.ctx.cache;
        if faulted {
            cache.admit(self);
        } else {
            cache.note_access(self);
        }

        Ok(TileGuard {
            tile: self,
            access,
            swap_error,
        })
    }

    fn validate(&self, meta: &mut TileMeta) -> Result<(), TileError> {
        let mut buf = alloc_zeroed(self.size())?;
        if let Some(validator) = &self.validator {
            validator.validate(&self.info, &mut buf)?;
        }

        *write(&self.pixels) = Some(buf);
        *lock(&self.hints) = None;
        meta.valid = true;
        meta.resident = true;
        meta.dirty = false;
        Ok(())
    }

    fn swap_in(&self, meta: &mut TileMeta) -> Result<Option<TileError>, TileError> {
        let mut buf = alloc_zeroed(self.size())?;
        let mut failure = None;

        if let Some(offset) = meta.swap_offset {
            match self.swap().read_into(offset, &mut buf) {
                Ok(()) => self.ctx.cache.record_swap_in(),
                Err(err) => {
                    log::warn!(
                        "tile ({}, {}) lost its swapped data, substituting zeroes: {}",
                        self.info.row,
                        self.info.col,
                        err
                    );
                    buf.fill(0);
                    meta.dirty = true;
                    *lock(&self.hints) = None;
                    self.ctx.degraded.fetch_add(1, Ordering::Relaxed);
                    failure = Some(err);
                }
            }
        }

        *write(&self.pixels) = Some(buf);
        meta.resident = true;
        Ok(failure)
    }

    fn unref(&self, access: Access) {
        let mut meta = lock(&self.meta);
        meta.ref_count = meta.ref_count.saturating_sub(1);
        if access.is_write() {
            meta.write_count = meta.write_count.saturating_sub(1);
            meta.dirty = true;
            if let Some(hints) = lock(&self.hints).as_mut() {
                hints.invalidate();
            }
        }
    }

    /// Hint for row `y`, `Unknown` if never computed.
    pub fn row_hint(&self, y: u32) -> RowHint {
        lock(&self.hints)
            .as_ref()
            .map_or(RowHint::Unknown, |hints| hints.get(y as usize))
    }

    pub fn set_row_hint(&self, y: u32, hint: RowHint) {
        let height = self.info.height as usize;
        lock(&self.hints)
            .get_or_insert_with(|| RowHintTable::new(height))
            .set(y as usize, hint);
    }

    pub fn invalidate_row_hints(&self) {
        if let Some(hints) = lock(&self.hints).as_mut() {
            hints.invalidate();
        }
    }

    /// Evict the tile if nobody is using it.
    ///
    /// Dirty tiles, and tiles that were never written to swap, are written
    /// out first. Called by the cache with its own lock held.
    pub(crate) fn try_evict(&self) -> Eviction {
        let Some(mut meta) = try_lock(&self.meta) else {
            return Eviction::Busy;
        };
        if meta.ref_count > 0 || !meta.resident {
            return Eviction::Busy;
        }
        let mut pixels = match self.pixels.try_write() {
            Ok(pixels) => pixels,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Eviction::Busy,
        };

        let wrote = meta.dirty || meta.swap_offset.is_none();
        if wrote {
            let data = pixels.as_deref().unwrap_or_default();
            if let Err(err) = self.persist(&mut meta, data) {
                return Eviction::Failed(err);
            }
        }

        *pixels = None;
        meta.resident = false;
        Eviction::Evicted { wrote }
    }

    /// Write a dirty resident tile to swap, keeping it resident.
    ///
    /// Waits for the tile's bookkeeping lock but skips the tile if its pixels
    /// are being written.
    pub(crate) fn write_back(&self) -> Result<WriteBack, TileError> {
        let mut meta = lock(&self.meta);
        self.write_back_locked(&mut meta)
    }

    /// Like [`write_back`](Self::write_back) but only for unreferenced tiles,
    /// and without waiting on any lock.
    pub(crate) fn try_write_back_idle(&self) -> Result<WriteBack, TileError> {
        let Some(mut meta) = try_lock(&self.meta) else {
            return Ok(WriteBack::Busy);
        };
        if meta.ref_count > 0 {
            return Ok(WriteBack::Busy);
        }
        self.write_back_locked(&mut meta)
    }

    fn write_back_locked(&self, meta: &mut TileMeta) -> Result<WriteBack, TileError> {
        if !meta.resident || !meta.dirty {
            return Ok(WriteBack::Clean);
        }
        let pixels = match self.pixels.try_read() {
            Ok(pixels) => pixels,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(WriteBack::Busy),
        };
        self.persist(meta, pixels.as_deref().unwrap_or_default())?;
        Ok(WriteBack::Written)
    }

    fn persist(&self, meta: &mut TileMeta, data: &[u8]) -> Result<(), TileError> {
        let swap = self.swap();
        let (offset, fresh) = match meta.swap_offset {
            Some(offset) => (offset, false),
            None => (swap.allocate(data.len()), true),
        };

        if let Err(err) = swap.write(offset, data) {
            if fresh {
                if let Err(free_err) = swap.free(offset, data.len()) {
                    log::warn!("unable to release swap range at {}: {}", offset, free_err);
                }
            }
            return Err(err);
        }

        meta.swap_offset = Some(offset);
        meta.dirty = false;
        Ok(())
    }

    /// Return the tile to the invalid state, releasing its buffer, cache
    /// entry and swap range.
    ///
    /// # Errors
    /// `Referenced` if any guard is alive. A failed swap truncate is returned
    /// after the tile has been reset.
    pub(crate) fn reset(&self) -> Result<(), TileError> {
        let mut meta = lock(&self.meta);
        if meta.ref_count > 0 {
            return Err(TileError::Referenced {
                row: self.info.row,
                col: self.info.col,
                count: meta.ref_count,
            });
        }

        self.ctx.cache.forget(self.key());
        *write(&self.pixels) = None;
        *lock(&self.hints) = None;
        let offset = meta.swap_offset.take();
        *meta = TileMeta::default();

        match offset {
            Some(offset) => self.swap().free(offset, self.size()),
            None => Ok(()),
        }
    }

    /// Reset the tile while its manager tears it down.
    pub(crate) fn destroy(&self) {
        if let Err(err) = self.reset() {
            log::warn!(
                "tile ({}, {}) not cleanly destroyed: {}",
                self.info.row,
                self.info.col,
                err
            );
        }
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = lock(&self.meta);
        f.debug_struct("Tile")
            .field("info", &self.info)
            .field("ref_count", &meta.ref_count)
            .field("write_count", &meta.write_count)
            .field("dirty", &meta.dirty)
            .field("valid", &meta.valid)
            .field("resident", &meta.resident)
            .field("swap_offset", &meta.swap_offset)
            .finish()
    }
}

/// Shared view of a tile's pixels
pub struct TileData<'a>(RwLockReadGuard<'a, Option<Vec<u8>>>);

impl Deref for TileData<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_deref().unwrap_or_default()
    }
}

/// Exclusive view of a tile's pixels
pub struct TileDataMut<'a>(RwLockWriteGuard<'a, Option<Vec<u8>>>);

impl Deref for TileDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_deref().unwrap_or_default()
    }
}

impl DerefMut for TileDataMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.0.as_deref_mut().unwrap_or_default()
    }
}

/// A live reference to a resident tile.
///
/// Dropping the guard releases the reference. Releasing a write guard marks
/// the tile dirty and invalidates its row hints.
#[must_use = "dropping the guard releases the tile immediately"]
pub struct TileGuard<'a> {
    tile: &'a Tile,
    access: Access,
    swap_error: Option<TileError>,
}

impl<'a> TileGuard<'a> {
    pub fn tile(&self) -> &'a Tile {
        self.tile
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Pixel data, `width * height * bpp` bytes in row order.
    pub fn pixels(&self) -> TileData<'_> {
        TileData(read(&self.tile.pixels))
    }

    /// Mutable pixel data. Invalidates the tile's row hints.
    ///
    /// # Errors
    /// `ReadOnly` if the tile was referenced for reading.
    pub fn pixels_mut(&mut self) -> Result<TileDataMut<'_>, TileError> {
        if !self.access.is_write() {
            return Err(TileError::ReadOnly);
        }
        let data = write(&self.tile.pixels);
        self.tile.invalidate_row_hints();
        Ok(TileDataMut(data))
    }

    fn pixel_offset(&self, x: u32, y: u32, len: usize) -> Result<usize, TileError> {
        let info = &self.tile.info;
        if x >= info.width || y >= info.height {
            return Err(TileError::RegionOutOfBounds {
                x,
                y,
                width: 1,
                height: 1,
                max_width: info.width,
                max_height: info.height,
            });
        }
        let bpp = info.format.bytes_per_pixel();
        if len != bpp {
            return Err(TileError::BufferSize {
                expected: bpp,
                actual: len,
            });
        }
        Ok(y as usize * info.rowstride() + x as usize * bpp)
    }

    /// Copy the pixel at tile-local `(x, y)` into `out`.
    pub fn read_pixel(&self, x: u32, y: u32, out: &mut [u8]) -> Result<(), TileError> {
        let offset = self.pixel_offset(x, y, out.len())?;
        let data = self.pixels();
        out.copy_from_slice(&data[offset..offset + out.len()]);
        Ok(())
    }

    /// Overwrite the pixel at tile-local `(x, y)`.
    pub fn write_pixel(&mut self, x: u32, y: u32, pixel: &[u8]) -> Result<(), TileError> {
        let offset = self.pixel_offset(x, y, pixel.len())?;
        let mut data = self.pixels_mut()?;
        data[offset..offset + pixel.len()].copy_from_slice(pixel);
        Ok(())
    }

    /// Classify rows `start..start + count` that have no hint yet.
    pub fn compute_row_hints(&self, start: u32, count: u32) {
        let info = self.tile.info;
        let data = read(&self.tile.pixels);
        let mut hints = lock(&self.tile.hints);
        hints
            .get_or_insert_with(|| RowHintTable::new(info.height as usize))
            .compute(
                data.as_deref().unwrap_or_default(),
                info.width as usize,
                info.format,
                start as usize,
                count as usize,
            );
    }

    /// The swap-in failure that left this tile zero-filled, if any
    pub fn swap_error(&self) -> Option<&TileError> {
        self.swap_error.as_ref()
    }

    pub fn take_swap_error(&mut self) -> Option<TileError> {
        self.swap_error.take()
    }

    /// Returns true if this reference faulted in zeroes instead of data
    pub fn is_degraded(&self) -> bool {
        self.swap_error.is_some()
    }

    /// Release the reference now.
    pub fn release(self) {
        drop(self)
    }
}

impl Deref for TileGuard<'_> {
    type Target = Tile;

    fn deref(&self) -> &Tile {
        self.tile
    }
}

impl Drop for TileGuard<'_> {
    fn drop(&mut self) {
        self.tile.unref(self.access);
    }
}

impl std::fmt::Debug for TileGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileGuard")
            .field("tile", &self.tile.info)
            .field("access", &self.access)
            .field("swap_error", &self.swap_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TileCacheConfig;
    use crate::swap::tests::{FullDisk, MemFile};
    use crate::swap::SwapFile;

    fn context(swap: Box<dyn SwapFile>, limit: usize) -> Arc<TileContext> {
        let config = TileCacheConfig::default().with_cache_bytes(limit);
        let cache = TileCache::with_swap_store(config, SwapStore::with_file(swap));
        Arc::new(TileContext {
            cache: Arc::new(cache),
            degraded: AtomicUsize::new(0),
        })
    }

    fn tile(ctx: &Arc<TileContext>, width: u32, height: u32, format: PixelFormat) -> Arc<Tile> {
        let info = TileInfo {
            key: TileKey {
                manager: ManagerId(0),
                serial: ctx.cache.next_serial(),
            },
            plane: Plane::Main,
            row: 0,
            col: 0,
            x: 0,
            y: 0,
            width,
            height,
            format,
        };
        Tile::new(info, ctx.clone(), None)
    }

    #[test]
    fn test_first_reference_validates_to_zeroes() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 4, 3, PixelFormat::Rgb);
        assert!(!tile.is_valid());
        assert!(!tile.is_resident());

        let guard = tile.reference(Access::Read).unwrap();
        assert!(tile.is_valid());
        assert_eq!(guard.pixels().len(), 4 * 3 * 3);
        assert!(guard.pixels().iter().all(|&b| b == 0));
        assert_eq!(tile.ref_count(), 1);
        assert_eq!(tile.write_ref_count(), 0);
        drop(guard);

        assert_eq!(tile.ref_count(), 0);
        assert!(!tile.is_dirty());
    }

    #[test]
    fn test_write_release_marks_dirty_and_clears_hints() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::GrayAlpha);

        let guard = tile.reference(Access::Read).unwrap();
        guard.compute_row_hints(0, 2);
        assert_eq!(tile.row_hint(0), RowHint::Transparent);
        drop(guard);

        let mut guard = tile.reference(Access::Write).unwrap();
        assert_eq!(tile.write_ref_count(), 1);
        guard.write_pixel(1, 1, &[5, 255]).unwrap();
        assert_eq!(tile.row_hint(0), RowHint::Unknown);
        guard.compute_row_hints(0, 2);
        guard.release();

        assert!(tile.is_dirty());
        assert_eq!(tile.row_hint(1), RowHint::Unknown);
        assert_eq!(tile.write_ref_count(), 0);
    }

    #[test]
    fn test_read_guard_cannot_write() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::Gray);
        let mut guard = tile.reference(Access::Read).unwrap();
        assert!(matches!(guard.pixels_mut(), Err(TileError::ReadOnly)));
        assert!(matches!(
            guard.write_pixel(0, 0, &[1]),
            Err(TileError::ReadOnly)
        ));
    }

    #[test]
    fn test_pixel_access_checks_bounds_and_size() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::RgbAlpha);
        let mut guard = tile.reference(Access::Write).unwrap();

        guard.write_pixel(1, 0, &[1, 2, 3, 4]).unwrap();
        let mut out = [0; 4];
        guard.read_pixel(1, 0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        assert!(matches!(
            guard.read_pixel(2, 0, &mut out),
            Err(TileError::RegionOutOfBounds { .. })
        ));
        assert!(matches!(
            guard.write_pixel(0, 0, &[1, 2]),
            Err(TileError::BufferSize { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_evict_and_swap_in_round_trip() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 3, 2, PixelFormat::Rgb);

        let mut guard = tile.reference(Access::Write).unwrap();
        guard
            .pixels_mut()
            .unwrap()
            .iter_mut()
            .enumerate()
            .for_each(|(i, b)| *b = i as u8);
        drop(guard);

        assert!(matches!(tile.try_evict(), Eviction::Evicted { wrote: true }));
        assert!(!tile.is_resident());
        assert!(tile.is_valid());
        assert!(!tile.is_dirty());
        assert_eq!(tile.swap_offset(), Some(0));

        let guard = tile.reference(Access::Read).unwrap();
        assert!(!guard.is_degraded());
        let expected: Vec<u8> = (0..18).collect();
        assert_eq!(&*guard.pixels(), expected.as_slice());
        drop(guard);

        // Clean and already in swap: no second write.
        assert!(matches!(tile.try_evict(), Eviction::Evicted { wrote: false }));
    }

    #[test]
    fn test_referenced_tile_is_never_evicted() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::Gray);
        let guard = tile.reference(Access::Read).unwrap();
        assert!(matches!(tile.try_evict(), Eviction::Busy));
        assert!(tile.is_resident());
        drop(guard);
        assert!(matches!(tile.try_evict(), Eviction::Evicted { .. }));
    }

    #[test]
    fn test_failed_swap_out_keeps_tile_resident() {
        let ctx = context(Box::new(FullDisk), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::Gray);
        let mut guard = tile.reference(Access::Write).unwrap();
        guard.write_pixel(0, 0, &[42]).unwrap();
        drop(guard);

        match tile.try_evict() {
            Eviction::Failed(err) => assert!(err.is_swap_error()),
            _ => panic!("eviction should fail on a full disk"),
        }
        assert!(tile.is_resident());
        assert!(tile.is_dirty());
        assert_eq!(tile.swap_offset(), None);
        assert_eq!(ctx.cache.swap().file_length(), 0);

        let guard = tile.reference(Access::Read).unwrap();
        assert_eq!(guard.pixels()[0], 42);
    }

    #[test]
    fn test_failed_swap_in_substitutes_zeroes() {
        let mem = MemFile::default();
        let ctx = context(Box::new(mem.clone()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::Gray);

        let mut guard = tile.reference(Access::Write).unwrap();
        guard.pixels_mut().unwrap().fill(9);
        drop(guard);
        assert!(matches!(tile.try_evict(), Eviction::Evicted { wrote: true }));

        // Lose the swap file contents behind the store's back.
        mem.bytes.lock().unwrap().clear();

        let guard = tile.reference(Access::Read).unwrap();
        assert!(guard.is_degraded());
        assert!(guard.swap_error().unwrap().is_swap_error());
        assert!(guard.pixels().iter().all(|&b| b == 0));
        assert_eq!(guard.pixels().len(), 4);
        assert!(tile.is_dirty());
        assert_eq!(ctx.degraded.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_write_back_keeps_tile_resident() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::Gray);
        assert!(matches!(tile.write_back(), Ok(WriteBack::Clean)));

        let mut guard = tile.reference(Access::Write).unwrap();
        guard.pixels_mut().unwrap().fill(3);
        drop(guard);

        assert!(matches!(tile.write_back(), Ok(WriteBack::Written)));
        assert!(tile.is_resident());
        assert!(!tile.is_dirty());
        assert_eq!(ctx.cache.swap().read(0, 4).unwrap(), vec![3; 4]);
    }

    #[test]
    fn test_reset_requires_no_references() {
        let ctx = context(Box::new(MemFile::default()), usize::MAX);
        let tile = tile(&ctx, 2, 2, PixelFormat::Gray);

        let guard = tile.reference(Access::Write).unwrap();
        assert!(matches!(
            tile.reset(),
            Err(TileError::Referenced { count: 1, .. })
        ));
        drop(guard);

        assert!(matches!(tile.try_evict(), Eviction::Evicted { .. }));
        assert_eq!(ctx.cache.swap().file_length(), 4);

        tile.reset().unwrap();
        assert!(!tile.is_valid());
        assert_eq!(tile.swap_offset(), None);
        assert_eq!(ctx.cache.swap().file_length(), 0);
    }
}
