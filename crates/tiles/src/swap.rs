//! Backing file for swapped-out tiles
//!
//! The swap file is a flat run of tile-sized byte ranges with no header. All
//! bookkeeping (which ranges are live, which are free) lives in memory, so the
//! file is meaningless once the process exits. The default backing is an
//! anonymous [`tempfile`] that the OS removes on exit.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{SwapOp, TileError};

/// Positioned I/O on the storage behind a [`SwapStore`].
pub trait SwapFile: Send {
    /// Fill `buf` from `offset`. Short reads are errors.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `data` at `offset`, growing the file if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Truncate or extend the file to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl SwapFile for File {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

struct SwapState {
    file: Option<Box<dyn SwapFile>>,
    /// Free ranges keyed by offset, never adjacent to each other
    free: BTreeMap<u64, u64>,
    /// Logical end of the allocated region
    length: u64,
}

/// Allocator and positioned I/O over a single swap file.
///
/// All operations are serialized by one mutex, held for the duration of the
/// I/O call.
pub struct SwapStore {
    dir: Option<PathBuf>,
    state: Mutex<SwapState>,
}

impl SwapStore {
    /// Create a store whose file is created in `dir` on the first write.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
            state: Mutex::new(SwapState {
                file: None,
                free: BTreeMap::new(),
                length: 0,
            }),
        }
    }

    /// Create a store on top of an already open backing.
    pub fn with_file(file: Box<dyn SwapFile>) -> Self {
        Self {
            dir: None,
            state: Mutex::new(SwapState {
                file: Some(file),
                free: BTreeMap::new(),
                length: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `len` bytes and return their offset.
    ///
    /// The first free range large enough is reused, otherwise the file is
    /// extended. Allocation itself never touches the file.
    pub fn allocate(&self, len: usize) -> u64 {
        let len = len as u64;
        let mut state = self.lock();

        let found = state
            .free
            .iter()
            .find(|(_, &free_len)| free_len >= len)
            .map(|(&offset, &free_len)| (offset, free_len));

        match found {
            Some((offset, free_len)) => {
                state.free.remove(&offset);
                if free_len > len {
                    state.free.insert(offset + len, free_len - len);
                }
                offset
            }
            None => {
                let offset = state.length;
                state.length += len;
                offset
            }
        }
    }

    /// Return a range to the free list.
    ///
    /// The range is merged with its free neighbours. If the merged range ends
    /// at the end of the file, the file is truncated; the bookkeeping is
    /// updated even if the truncate itself fails.
    pub fn free(&self, offset: u64, len: usize) -> Result<(), TileError> {
        let mut state = self.lock();
        let mut start = offset;
        let mut end = offset + len as u64;

        let previous = state
            .free
            .range(..start)
            .next_back()
            .map(|(&o, &l)| (o, l));
        if let Some((prev_offset, prev_len)) = previous {
            if prev_offset + prev_len == start {
                state.free.remove(&prev_offset);
                start = prev_offset;
            }
        }
        if let Some(next_len) = state.free.remove(&end) {
            end += next_len;
        }

        if end >= state.length {
            state.length = start;
            if let Some(file) = state.file.as_mut() {
                file.set_len(start).map_err(|source| TileError::SwapIo {
                    op: SwapOp::Truncate,
                    offset: start,
                    len: 0,
                    source,
                })?;
            }
        } else {
            state.free.insert(start, end - start);
        }
        Ok(())
    }

    /// Write `data` at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), TileError> {
        let mut state = self.lock();
        let file = self.open(&mut state)?;
        file.write_at(offset, data).map_err(|source| TileError::SwapIo {
            op: SwapOp::Write,
            offset,
            len: data.len(),
            source,
        })
    }

    /// Read `len` bytes from `offset`.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TileError> {
        let mut buf = vec![0; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` from `offset`.
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<(), TileError> {
        let mut state = self.lock();
        let file = self.open(&mut state)?;
        file.read_at(offset, buf).map_err(|source| TileError::SwapIo {
            op: SwapOp::Read,
            offset,
            len: buf.len(),
            source,
        })
    }

    fn open<'s>(&self, state: &'s mut SwapState) -> Result<&'s mut Box<dyn SwapFile>, TileError> {
        let file: Box<dyn SwapFile> = match state.file.take() {
            Some(file) => file,
            None => {
                let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
                let file = fs::create_dir_all(&dir)
                    .and_then(|()| tempfile::tempfile_in(&dir))
                    .map_err(|source| TileError::SwapOpen {
                        dir: dir.clone(),
                        source,
                    })?;
                log::debug!("created swap file in {}", dir.display());
                Box::new(file)
            }
        };
        Ok(state.file.insert(file))
    }

    /// Logical length of the swap file in bytes
    pub fn file_length(&self) -> u64 {
        self.lock().length
    }

    /// Free ranges as `(offset, len)` pairs in offset order
    pub fn free_ranges(&self) -> Vec<(u64, u64)> {
        self.lock().free.iter().map(|(&o, &l)| (o, l)).collect()
    }

    /// Returns true once the backing file exists
    pub fn is_open(&self) -> bool {
        self.lock().file.is_some()
    }
}

impl std::fmt::Debug for SwapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SwapStore")
            .field("dir", &self.dir)
            .field("length", &state.length)
            .field("free", &state.free)
            .field("open", &state.file.is_some())
            .finish()
    }
}
