use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::error::{DbError, DbResult};

/// Pages are the unit of all disk I/O. Both the record file and the index
/// file are sequences of fixed-size pages addressed by page number.
pub const PAGE_SIZE: usize = 1024;

/// Page number within one file. Page 0 of an index file is reserved for
/// tree metadata, so a stored child/next pointer of 0 means "none" and a
/// root pid of -1 means "empty tree".
pub type PageId = i32;

/// A single 1 KiB page of data.
pub struct Page {
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new() -> Self {
        Page { data: [0; PAGE_SIZE] }
    }

    /// Read a little-endian i32 at `offset`.
    pub fn get_i32(&self, offset: usize) -> i32 {
        let bytes = &self.data[offset..offset + 4];
        i32::from_le_bytes(bytes.try_into().unwrap())
    }

    /// Write a little-endian i32 at `offset`.
    pub fn set_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// PageFile: reads and writes whole 1 KiB pages of a single backing file.
/// Write mode creates the file if it does not exist; a file may only grow
/// by writing the page at `end_pid()`.
pub struct PageFile {
    file: File,
    end_pid: PageId,
}

impl PageFile {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> DbResult<PageFile> {
        let file = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(&path)?,
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?,
        };
        let file_len = file.metadata()?.len();
        let end_pid = (file_len as usize / PAGE_SIZE) as PageId;

        debug!(
            "opened page file {:?} ({:?}, {} pages)",
            path.as_ref(),
            mode,
            end_pid
        );

        Ok(PageFile { file, end_pid })
    }

    /// Read page `pid` from disk. Reading outside `[0, end_pid)` is an I/O
    /// error, not a silent zero page.
    pub fn read(&mut self, pid: PageId) -> DbResult<Page> {
        if pid < 0 || pid >= self.end_pid {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {} out of range (file has {})", pid, self.end_pid),
            )));
        }
        let mut page = Page::new();
        let offset = (pid as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut page.data)?;
        Ok(page)
    }

    /// Write page `pid` to disk. Writing `end_pid()` extends the file by
    /// one page; writing further past the end is rejected.
    pub fn write(&mut self, pid: PageId, page: &Page) -> DbResult<()> {
        if pid < 0 || pid > self.end_pid {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot write page {} past end {}", pid, self.end_pid),
            )));
        }
        let offset = (pid as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.data)?;
        if pid == self.end_pid {
            self.end_pid += 1;
        }
        Ok(())
    }

    /// Number of pages currently in the file. The next write at this pid
    /// allocates a fresh page.
    pub fn end_pid(&self) -> PageId {
        self.end_pid
    }

    pub fn close(mut self) -> DbResult<()> {
        self.file.flush()?;
        Ok(())
    }
}
