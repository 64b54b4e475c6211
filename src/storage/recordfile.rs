use std::path::Path;

use log::debug;

use crate::error::{DbError, DbResult};
use crate::storage::pagefile::{OpenMode, Page, PageFile, PageId};

// ┌────────────────────────────────────────────────────────────────────┐
// │ Offset │ Length │ Description                                      │
// │────────┼────────┼──────────────────────────────────────────────────│
// │   0    │   4    │ RECORD_COUNT (i32) – records stored in this page │
// │   4    │  104   │ slot 0: [key i32][value_len u8][value ≤99 bytes] │
// │  108   │  104   │ slot 1 …                                         │
// └────────────────────────────────────────────────────────────────────┘

const PAGE_HEADER_SIZE: usize = 4;
const SLOT_SIZE: usize = 104;
pub const MAX_VALUE_LEN: usize = 99;
pub const RECORDS_PER_PAGE: usize =
    (crate::storage::pagefile::PAGE_SIZE - PAGE_HEADER_SIZE) / SLOT_SIZE;

/// Locator of one tuple in a record file: page number plus slot number.
/// The index stores these as opaque payloads and hands them back to the
/// query engine, which resolves them through `RecordFile::read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordId {
    pub pid: PageId,
    pub sid: i32,
}

/// RecordFile: a flat, append-only file of (integer key, string value)
/// tuples packed into fixed slots. Appends fill the last page before
/// starting a new one; nothing is ever deleted or moved, so a RecordId
/// stays valid for the lifetime of the file.
pub struct RecordFile {
    pf: PageFile,
    end_rid: RecordId,
}

impl RecordFile {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> DbResult<RecordFile> {
        let mut pf = PageFile::open(path, mode)?;

        let end_rid = if pf.end_pid() == 0 {
            RecordId { pid: 0, sid: 0 }
        } else {
            let last = pf.end_pid() - 1;
            let page = pf.read(last)?;
            let count = page.get_i32(0);
            if count < 0 || count as usize > RECORDS_PER_PAGE {
                return Err(DbError::CorruptPage(last));
            }
            if count as usize == RECORDS_PER_PAGE {
                RecordId { pid: last + 1, sid: 0 }
            } else {
                RecordId { pid: last, sid: count }
            }
        };

        Ok(RecordFile { pf, end_rid })
    }

    /// Append one tuple and return its locator. Values longer than
    /// `MAX_VALUE_LEN` bytes are truncated to fit the slot.
    pub fn append(&mut self, key: i32, value: &str) -> DbResult<RecordId> {
        let rid = self.end_rid;

        let mut page = if rid.sid == 0 {
            Page::new()
        } else {
            self.pf.read(rid.pid)?
        };

        let bytes = value.as_bytes();
        let len = bytes.len().min(MAX_VALUE_LEN);
        let offset = PAGE_HEADER_SIZE + rid.sid as usize * SLOT_SIZE;
        page.set_i32(offset, key);
        page.data[offset + 4] = len as u8;
        page.data[offset + 5..offset + 5 + len].copy_from_slice(&bytes[..len]);
        page.set_i32(0, rid.sid + 1);

        self.pf.write(rid.pid, &page)?;
        self.end_rid = Self::next_rid(rid);

        debug!("appended key={} at ({}, {})", key, rid.pid, rid.sid);
        Ok(rid)
    }

    /// Read the tuple at `rid`. A slot number at or past the page's record
    /// count is `OutOfRange`; a bad page number surfaces as an I/O error.
    pub fn read(&mut self, rid: RecordId) -> DbResult<(i32, String)> {
        let page = self.pf.read(rid.pid)?;
        let count = page.get_i32(0);
        if rid.sid < 0 || rid.sid >= count {
            return Err(DbError::OutOfRange {
                eid: rid.sid.max(0) as usize,
                count: count.max(0) as usize,
            });
        }
        let offset = PAGE_HEADER_SIZE + rid.sid as usize * SLOT_SIZE;
        let key = page.get_i32(offset);
        let len = page.data[offset + 4] as usize;
        let value = String::from_utf8_lossy(&page.data[offset + 5..offset + 5 + len]).into_owned();
        Ok((key, value))
    }

    /// One past the last stored record; scans run while `rid < end_rid()`.
    pub fn end_rid(&self) -> RecordId {
        self.end_rid
    }

    /// The locator following `rid` in append order. Every page before the
    /// last is full, so rolling over at `RECORDS_PER_PAGE` is exact.
    pub fn next_rid(rid: RecordId) -> RecordId {
        if rid.sid as usize + 1 >= RECORDS_PER_PAGE {
            RecordId { pid: rid.pid + 1, sid: 0 }
        } else {
            RecordId { pid: rid.pid, sid: rid.sid + 1 }
        }
    }

    pub fn close(self) -> DbResult<()> {
        self.pf.close()
    }
}
