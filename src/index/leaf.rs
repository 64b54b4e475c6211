use crate::error::{DbError, DbResult};
use crate::storage::pagefile::{Page, PageFile, PageId, PAGE_SIZE};
use crate::storage::recordfile::RecordId;

// ┌──────────────────────────────────────────────────────────────────────┐
// │ Offset │ Length │ Description                                        │
// │────────┼────────┼────────────────────────────────────────────────────│
// │   0    │   4    │ ENTRY_COUNT (i32)                                  │
// │   4    │  12×N  │ entries: [key i32][rid.pid i32][rid.sid i32] …     │
// │ 1020   │   4    │ NEXT_LEAF (i32) – pid of next leaf, 0 if last      │
// └──────────────────────────────────────────────────────────────────────┘

const COUNT_OFFSET: usize = 0;
const ENTRY_START: usize = 4;
const ENTRY_SIZE: usize = 12;
const NEXT_PTR_OFFSET: usize = PAGE_SIZE - 4;

/// Entries a leaf page can hold after the count prefix and the trailing
/// next-leaf pointer are reserved.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - ENTRY_START - 4) / ENTRY_SIZE;

/// Leaf node: a sorted run of (key, RecordId) entries plus a forward
/// pointer chaining leaves in key order. Materialized from a page,
/// mutated in memory, written back whole.
pub struct LeafNode {
    page: Page,
}

impl LeafNode {
    pub fn new() -> Self {
        LeafNode { page: Page::new() }
    }

    /// Deserialize from a raw page. A stored entry count outside
    /// `[0, LEAF_CAPACITY]` means the page is not a well-formed leaf.
    pub fn from_page(page: Page, pid: PageId) -> DbResult<LeafNode> {
        let count = page.get_i32(COUNT_OFFSET);
        if count < 0 || count as usize > LEAF_CAPACITY {
            return Err(DbError::CorruptPage(pid));
        }
        Ok(LeafNode { page })
    }

    pub fn read(pid: PageId, pf: &mut PageFile) -> DbResult<LeafNode> {
        Self::from_page(pf.read(pid)?, pid)
    }

    pub fn write(&self, pid: PageId, pf: &mut PageFile) -> DbResult<()> {
        if self.key_count() > LEAF_CAPACITY {
            return Err(DbError::NodeFull);
        }
        pf.write(pid, &self.page)
    }

    pub fn key_count(&self) -> usize {
        self.page.get_i32(COUNT_OFFSET) as usize
    }

    fn set_key_count(&mut self, count: usize) {
        self.page.set_i32(COUNT_OFFSET, count as i32);
    }

    pub fn next_ptr(&self) -> PageId {
        self.page.get_i32(NEXT_PTR_OFFSET)
    }

    pub fn set_next_ptr(&mut self, pid: PageId) {
        self.page.set_i32(NEXT_PTR_OFFSET, pid);
    }

    fn entry_offset(eid: usize) -> usize {
        ENTRY_START + eid * ENTRY_SIZE
    }

    fn key_at(&self, eid: usize) -> i32 {
        self.page.get_i32(Self::entry_offset(eid))
    }

    pub fn read_entry(&self, eid: usize) -> DbResult<(i32, RecordId)> {
        let count = self.key_count();
        if eid >= count {
            return Err(DbError::OutOfRange { eid, count });
        }
        let offset = Self::entry_offset(eid);
        let key = self.page.get_i32(offset);
        let rid = RecordId {
            pid: self.page.get_i32(offset + 4),
            sid: self.page.get_i32(offset + 8),
        };
        Ok((key, rid))
    }

    fn write_entry(&mut self, eid: usize, key: i32, rid: RecordId) {
        let offset = Self::entry_offset(eid);
        self.page.set_i32(offset, key);
        self.page.set_i32(offset + 4, rid.pid);
        self.page.set_i32(offset + 8, rid.sid);
    }

    /// Find the first entry whose key is >= `key`. Returns the entry index
    /// and whether it is an exact match; without a match the index is still
    /// the insertion point, which may equal `key_count()`.
    pub fn locate(&self, key: i32) -> (usize, bool) {
        let count = self.key_count();
        let mut lo = 0;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo, lo < count && self.key_at(lo) == key)
    }

    // Insertion point for a new entry: after any existing equal keys, so
    // duplicates keep their insertion order.
    fn upper_bound(&self, key: i32) -> usize {
        let mut lo = 0;
        let mut hi = self.key_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Insert keeping ascending key order. `NodeFull` when the leaf is at
    /// capacity; the caller then switches to `insert_and_split`.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> DbResult<()> {
        let count = self.key_count();
        if count >= LEAF_CAPACITY {
            return Err(DbError::NodeFull);
        }
        let at = self.upper_bound(key);
        let src = Self::entry_offset(at);
        let dst = src + ENTRY_SIZE;
        let end = Self::entry_offset(count);
        self.page.data.copy_within(src..end, dst);
        self.write_entry(at, key, rid);
        self.set_key_count(count + 1);
        Ok(())
    }

    /// Split this full leaf while inserting (key, rid). The lower half of
    /// all entries (new one included) stays here, the upper half moves to
    /// `sibling`, and the returned separator is the sibling's first key.
    /// The old next pointer transfers to the sibling; the caller allocates
    /// the sibling's pid and points our next pointer at it.
    pub fn insert_and_split(
        &mut self,
        key: i32,
        rid: RecordId,
        sibling: &mut LeafNode,
    ) -> DbResult<i32> {
        let count = self.key_count();
        let mut entries = Vec::with_capacity(count + 1);
        for eid in 0..count {
            entries.push(self.read_entry(eid)?);
        }
        let at = self.upper_bound(key);
        entries.insert(at, (key, rid));

        // Aim for an even split, then nudge the boundary so a run of equal
        // keys stays on one side where possible. When a single key fills
        // the node the separator has to repeat it; search compensates by
        // descending to the leftmost candidate leaf.
        let total = entries.len();
        let mut split = total.div_ceil(2);
        while split < total && entries[split - 1].0 == entries[split].0 {
            split += 1;
        }
        if split == total {
            split = total.div_ceil(2);
            while split > 0 && entries[split - 1].0 == entries[split].0 {
                split -= 1;
            }
            if split == 0 {
                split = total / 2;
            }
        }

        sibling.set_next_ptr(self.next_ptr());
        sibling.set_key_count(total - split);
        for (i, &(k, r)) in entries[split..].iter().enumerate() {
            sibling.write_entry(i, k, r);
        }

        self.set_key_count(split);
        for (i, &(k, r)) in entries[..split].iter().enumerate() {
            self.write_entry(i, k, r);
        }

        Ok(entries[split].0)
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        LeafNode::new()
    }
}
