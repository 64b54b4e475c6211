use crate::error::{DbError, DbResult};
use crate::storage::pagefile::{Page, PageFile, PageId, PAGE_SIZE};

// ┌──────────────────────────────────────────────────────────────────────┐
// │ Offset │ Length │ Description                                        │
// │────────┼────────┼────────────────────────────────────────────────────│
// │   0    │   4    │ ENTRY_COUNT (i32)                                  │
// │   4    │   4    │ FIRST_CHILD (i32) – subtree for keys below entry 0 │
// │   8    │  8×N   │ entries: [key i32][child pid i32] …                │
// └──────────────────────────────────────────────────────────────────────┘

const COUNT_OFFSET: usize = 0;
const FIRST_CHILD_OFFSET: usize = 4;
const ENTRY_START: usize = 8;
const ENTRY_SIZE: usize = 8;

/// Routing entries a non-leaf page can hold after the count prefix and
/// the leading child pointer are reserved.
pub const NONLEAF_CAPACITY: usize = (PAGE_SIZE - ENTRY_START) / ENTRY_SIZE;

/// Non-leaf node: a sorted run of (key, child pid) routing entries plus a
/// leading child pointer for keys below the first routing key. The
/// subtree behind entry i holds keys in [key_i, key_{i+1}).
pub struct NonLeafNode {
    page: Page,
}

impl NonLeafNode {
    pub fn new() -> Self {
        NonLeafNode { page: Page::new() }
    }

    pub fn from_page(page: Page, pid: PageId) -> DbResult<NonLeafNode> {
        let count = page.get_i32(COUNT_OFFSET);
        if count < 0 || count as usize > NONLEAF_CAPACITY {
            return Err(DbError::CorruptPage(pid));
        }
        Ok(NonLeafNode { page })
    }

    pub fn read(pid: PageId, pf: &mut PageFile) -> DbResult<NonLeafNode> {
        Self::from_page(pf.read(pid)?, pid)
    }

    pub fn write(&self, pid: PageId, pf: &mut PageFile) -> DbResult<()> {
        if self.key_count() > NONLEAF_CAPACITY {
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

    fn first_child(&self) -> PageId {
        self.page.get_i32(FIRST_CHILD_OFFSET)
    }

    fn set_first_child(&mut self, pid: PageId) {
        self.page.set_i32(FIRST_CHILD_OFFSET, pid);
    }

    fn entry_offset(eid: usize) -> usize {
        ENTRY_START + eid * ENTRY_SIZE
    }

    fn entry(&self, eid: usize) -> (i32, PageId) {
        let offset = Self::entry_offset(eid);
        (self.page.get_i32(offset), self.page.get_i32(offset + 4))
    }

    fn write_entry(&mut self, eid: usize, key: i32, child: PageId) {
        let offset = Self::entry_offset(eid);
        self.page.set_i32(offset, key);
        self.page.set_i32(offset + 4, child);
    }

    /// Child pointer for the subtree that may contain `key`: the child of
    /// the last routing entry with key <= `key`, or the leading child when
    /// `key` is below every routing key. A routing node with no entries
    /// cannot route anything, so it is reported as corrupt.
    pub fn locate_child_ptr(&self, key: i32, pid: PageId) -> DbResult<PageId> {
        let count = self.key_count();
        if count == 0 {
            return Err(DbError::CorruptPage(pid));
        }
        let mut child = self.first_child();
        for eid in 0..count {
            let (entry_key, entry_child) = self.entry(eid);
            if key < entry_key {
                break;
            }
            child = entry_child;
        }
        Ok(child)
    }

    /// Child where an ordered scan for `key` must begin: the child of the
    /// last routing entry strictly below `key`. Differs from
    /// `locate_child_ptr` only when `key` equals a routing key —
    /// duplicates of a separator may extend into the subtree left of it,
    /// and a scan has to start there.
    pub fn locate_scan_child_ptr(&self, key: i32, pid: PageId) -> DbResult<PageId> {
        let count = self.key_count();
        if count == 0 {
            return Err(DbError::CorruptPage(pid));
        }
        let mut child = self.first_child();
        for eid in 0..count {
            let (entry_key, entry_child) = self.entry(eid);
            if key <= entry_key {
                break;
            }
            child = entry_child;
        }
        Ok(child)
    }

    /// Insert a routing entry keeping ascending key order. `NodeFull` at
    /// capacity; the tree then switches to `insert_and_split`.
    pub fn insert(&mut self, key: i32, child: PageId) -> DbResult<()> {
        let count = self.key_count();
        if count >= NONLEAF_CAPACITY {
            return Err(DbError::NodeFull);
        }
        let mut at = 0;
        while at < count && self.entry(at).0 <= key {
            at += 1;
        }
        let src = Self::entry_offset(at);
        let dst = src + ENTRY_SIZE;
        let end = Self::entry_offset(count);
        self.page.data.copy_within(src..end, dst);
        self.write_entry(at, key, child);
        self.set_key_count(count + 1);
        Ok(())
    }

    /// Split this full routing node while inserting (key, child). The
    /// median key is promoted as the separator and appears in neither
    /// half; it becomes the sibling's implicit lower bound, with the
    /// median's child as the sibling's leading child. The caller allocates
    /// the sibling's pid and pushes the separator to the parent.
    pub fn insert_and_split(
        &mut self,
        key: i32,
        child: PageId,
        sibling: &mut NonLeafNode,
    ) -> DbResult<i32> {
        let count = self.key_count();
        let mut entries: Vec<(i32, PageId)> = (0..count).map(|eid| self.entry(eid)).collect();
        let mut at = 0;
        while at < count && entries[at].0 <= key {
            at += 1;
        }
        entries.insert(at, (key, child));

        let total = entries.len();
        let mid = total / 2;
        let separator = entries[mid].0;

        sibling.set_first_child(entries[mid].1);
        sibling.set_key_count(total - mid - 1);
        for (i, &(k, c)) in entries[mid + 1..].iter().enumerate() {
            sibling.write_entry(i, k, c);
        }

        self.set_key_count(mid);
        for (i, &(k, c)) in entries[..mid].iter().enumerate() {
            self.write_entry(i, k, c);
        }

        Ok(separator)
    }

    /// Set up a fresh root over two children after a root split: one
    /// routing entry, with everything below `key` going left.
    pub fn init_root(&mut self, key: i32, left: PageId, right: PageId) {
        self.set_first_child(left);
        self.write_entry(0, key, right);
        self.set_key_count(1);
    }
}

impl Default for NonLeafNode {
    fn default() -> Self {
        NonLeafNode::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_root_routes_both_sides() {
        let mut node = NonLeafNode::new();
        node.init_root(50, 3, 4);
        assert_eq!(node.key_count(), 1);
        assert_eq!(node.locate_child_ptr(10, 0).unwrap(), 3);
        assert_eq!(node.locate_child_ptr(50, 0).unwrap(), 4);
        assert_eq!(node.locate_child_ptr(99, 0).unwrap(), 4);
    }

    #[test]
    fn locate_child_ptr_picks_last_entry_at_or_below_key() {
        let mut node = NonLeafNode::new();
        node.init_root(10, 1, 2);
        node.insert(20, 3).unwrap();
        node.insert(30, 4).unwrap();

        assert_eq!(node.locate_child_ptr(5, 0).unwrap(), 1);
        assert_eq!(node.locate_child_ptr(10, 0).unwrap(), 2);
        assert_eq!(node.locate_child_ptr(19, 0).unwrap(), 2);
        assert_eq!(node.locate_child_ptr(20, 0).unwrap(), 3);
        assert_eq!(node.locate_child_ptr(25, 0).unwrap(), 3);
        assert_eq!(node.locate_child_ptr(30, 0).unwrap(), 4);
        assert_eq!(node.locate_child_ptr(1000, 0).unwrap(), 4);
    }

    #[test]
    fn scan_descent_goes_left_of_an_equal_routing_key() {
        let mut node = NonLeafNode::new();
        node.init_root(10, 1, 2);
        node.insert(20, 3).unwrap();

        assert_eq!(node.locate_scan_child_ptr(5, 0).unwrap(), 1);
        assert_eq!(node.locate_scan_child_ptr(10, 0).unwrap(), 1);
        assert_eq!(node.locate_scan_child_ptr(15, 0).unwrap(), 2);
        assert_eq!(node.locate_scan_child_ptr(20, 0).unwrap(), 2);
        assert_eq!(node.locate_scan_child_ptr(25, 0).unwrap(), 3);
    }

    #[test]
    fn empty_routing_node_is_corrupt() {
        let node = NonLeafNode::new();
        assert!(matches!(
            node.locate_child_ptr(1, 9),
            Err(DbError::CorruptPage(9))
        ));
    }

    #[test]
    fn insert_at_capacity_is_node_full() {
        let mut node = NonLeafNode::new();
        node.init_root(0, 100, 101);
        for key in 1..NONLEAF_CAPACITY as i32 {
            node.insert(key, 101 + key).unwrap();
        }
        assert!(matches!(node.insert(999, 1), Err(DbError::NodeFull)));
    }

    #[test]
    fn split_promotes_median_without_copying_it() {
        let mut node = NonLeafNode::new();
        node.init_root(0, 100, 101);
        for key in 1..NONLEAF_CAPACITY as i32 {
            node.insert(key * 2, 101 + key).unwrap();
        }

        let mut sibling = NonLeafNode::new();
        let sep = node.insert_and_split(33, 999, &mut sibling).unwrap();

        // One key promoted, the rest distributed.
        assert_eq!(node.key_count() + sibling.key_count(), NONLEAF_CAPACITY);
        for eid in 0..node.key_count() {
            assert!(node.entry(eid).0 < sep);
        }
        for eid in 0..sibling.key_count() {
            assert!(sibling.entry(eid).0 > sep);
        }

        // Keys equal to the separator route into the sibling's leading
        // child, the one that travelled up with the median.
        let via = sibling.locate_child_ptr(sep, 0).unwrap();
        assert_eq!(via, sibling.first_child());
    }

    #[test]
    fn corrupt_count_rejected_on_deserialize() {
        let mut page = Page::new();
        page.set_i32(0, -2);
        assert!(matches!(
            NonLeafNode::from_page(page, 5),
            Err(DbError::CorruptPage(5))
        ));
    }
}
