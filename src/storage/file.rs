//! Page File
//!
//! Full-page reads and writes at fixed offsets in the backing file.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::{HeapError, Result};

/// The backing file, viewed as an array of `page_size`-byte pages
///
/// ## Concurrency:
/// - `file`: one Mutex around the handle, since seek + read/write must not
///   interleave. Callers additionally hold the page's lock.
pub struct PageFile {
    path: PathBuf,
    file: Mutex<File>,
    page_size: usize,
    sync_on_write: bool,
}

impl PageFile {
    /// Open or create the file. Existing content is kept.
    pub fn open(path: &Path, page_size: usize, sync_on_write: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            page_size,
            sync_on_write,
        })
    }

    /// Read one page
    ///
    /// Returns:
    /// - `Ok(Some(page))`: a full page
    /// - `Ok(None)`: the page starts at or past the end of the file
    /// - `Err(CorruptPage)`: the file ends in the middle of the page
    pub fn read_page(&self, page_nr: u32) -> Result<Option<BytesMut>> {
        let offset = self.offset_of(page_nr);
        let mut file = self.file.lock();

        if offset >= file.metadata()?.len() {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut page = BytesMut::zeroed(self.page_size);
        let read = read_fully(&mut *file, &mut page)?;
        if read < self.page_size {
            return Err(HeapError::CorruptPage {
                page_nr,
                expected: self.page_size,
                actual: read,
            });
        }

        Ok(Some(page))
    }

    /// Write one full page at its fixed offset
    pub fn write_page(&self, page_nr: u32, page: &[u8]) -> Result<()> {
        debug_assert_eq!(page.len(), self.page_size);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset_of(page_nr)))?;
        file.write_all(page)?;

        if self.sync_on_write {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Number of pages the file spans (a trailing partial page counts)
    pub fn page_count(&self) -> Result<u32> {
        let len = self.file.lock().metadata()?.len();
        let count = len.div_ceil(self.page_size as u64);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Force written pages to disk
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn offset_of(&self, page_nr: u32) -> u64 {
        page_nr as u64 * self.page_size as u64
    }
}

/// Read until `buf` is full or the file ends; returns bytes read
fn read_fully(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
