use std::path::Path;

use log::debug;

use crate::error::{DbError, DbResult};
use crate::index::leaf::LeafNode;
use crate::index::nonleaf::NonLeafNode;
use crate::storage::pagefile::{OpenMode, Page, PageFile, PageId};
use crate::storage::recordfile::RecordId;

// Page 0 of the index file holds the tree metadata:
//   [0..4)  root pid   (i32, -1 = empty tree)
//   [4..8)  tree height (i32, 0 = empty, 1 = root is a leaf)
const META_ROOT_OFFSET: usize = 0;
const META_HEIGHT_OFFSET: usize = 4;

/// Position of one leaf entry for ordered traversal: leaf pid plus the
/// zero-based entry index within that leaf. `eid` may equal the leaf's
/// entry count, meaning "continue in the next leaf"; `read_forward`
/// normalizes that before reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCursor {
    pub pid: PageId,
    pub eid: usize,
}

/// B+-tree index over (i32 key, RecordId) pairs, backed by one page file.
/// Page 0 stores the root pid and tree height; everything else is leaf or
/// non-leaf node pages. Nodes are read, mutated and written back per
/// operation; the metadata fields live here for the whole session and are
/// persisted at close and after every root change.
pub struct BTreeIndex {
    pf: PageFile,
    mode: OpenMode,
    root_pid: PageId,
    tree_height: i32,
}

impl BTreeIndex {
    /// Open an index file. Write mode creates it if absent and initializes
    /// the metadata page to an empty tree; otherwise the persisted root
    /// pid and height are loaded and cross-checked.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> DbResult<BTreeIndex> {
        let mut pf = PageFile::open(path, mode)?;

        if pf.end_pid() == 0 {
            let mut index = BTreeIndex { pf, mode, root_pid: -1, tree_height: 0 };
            if mode == OpenMode::Write {
                index.save_meta()?;
            }
            return Ok(index);
        }

        let meta = pf.read(0)?;
        let root_pid = meta.get_i32(META_ROOT_OFFSET);
        let tree_height = meta.get_i32(META_HEIGHT_OFFSET);
        let consistent =
            (root_pid > 0 && tree_height >= 1) || (root_pid <= 0 && tree_height == 0);
        if !consistent {
            return Err(DbError::CorruptMetadata);
        }

        debug!("opened index: root={} height={}", root_pid, tree_height);
        Ok(BTreeIndex {
            pf,
            mode,
            root_pid: if root_pid <= 0 { -1 } else { root_pid },
            tree_height,
        })
    }

    /// Persist metadata (write mode only; a read session has nothing to
    /// save and its file handle cannot be written) and close the backing
    /// file.
    pub fn close(mut self) -> DbResult<()> {
        if self.mode == OpenMode::Write {
            self.save_meta()?;
        }
        self.pf.close()
    }

    fn save_meta(&mut self) -> DbResult<()> {
        let mut meta = Page::new();
        meta.set_i32(META_ROOT_OFFSET, self.root_pid);
        meta.set_i32(META_HEIGHT_OFFSET, self.tree_height);
        self.pf.write(0, &meta)
    }

    pub fn root_pid(&self) -> PageId {
        self.root_pid
    }

    pub fn tree_height(&self) -> i32 {
        self.tree_height
    }

    /// Insert a (key, rid) pair. Descends to the target leaf; an overflow
    /// there splits the leaf and pushes a separator up the recorded path,
    /// splitting routing nodes as needed. When the separator outruns the
    /// path the root itself split, so a fresh root is installed and the
    /// tree grows by one level.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> DbResult<()> {
        if self.root_pid < 0 {
            let mut leaf = LeafNode::new();
            leaf.insert(key, rid)?;
            let pid = self.pf.end_pid();
            leaf.write(pid, &mut self.pf)?;
            self.root_pid = pid;
            self.tree_height = 1;
            debug!("first insert: leaf root at page {}", pid);
            return self.save_meta();
        }

        // Descend, remembering the routing pages visited.
        let mut path: Vec<PageId> = Vec::with_capacity(self.tree_height as usize);
        let mut pid = self.root_pid;
        for _ in 1..self.tree_height {
            let node = NonLeafNode::read(pid, &mut self.pf)?;
            path.push(pid);
            pid = node.locate_child_ptr(key, pid)?;
        }

        let mut leaf = LeafNode::read(pid, &mut self.pf)?;
        match leaf.insert(key, rid) {
            Ok(()) => return leaf.write(pid, &mut self.pf),
            Err(DbError::NodeFull) => {}
            Err(e) => return Err(e),
        }

        debug!("leaf {} full, splitting", pid);
        let mut sibling = LeafNode::new();
        let mut separator = leaf.insert_and_split(key, rid, &mut sibling)?;
        let sibling_pid = self.pf.end_pid();
        leaf.set_next_ptr(sibling_pid);
        sibling.write(sibling_pid, &mut self.pf)?;
        leaf.write(pid, &mut self.pf)?;

        // Walk the path back up, inserting the separator at each level.
        let mut new_child = sibling_pid;
        while let Some(parent_pid) = path.pop() {
            let mut parent = NonLeafNode::read(parent_pid, &mut self.pf)?;
            match parent.insert(separator, new_child) {
                Ok(()) => return parent.write(parent_pid, &mut self.pf),
                Err(DbError::NodeFull) => {}
                Err(e) => return Err(e),
            }

            debug!("routing node {} full, splitting", parent_pid);
            let mut parent_sibling = NonLeafNode::new();
            separator = parent.insert_and_split(separator, new_child, &mut parent_sibling)?;
            let parent_sibling_pid = self.pf.end_pid();
            parent_sibling.write(parent_sibling_pid, &mut self.pf)?;
            parent.write(parent_pid, &mut self.pf)?;
            new_child = parent_sibling_pid;
        }

        // The split reached the old root; grow a new root level above it.
        let mut root = NonLeafNode::new();
        root.init_root(separator, self.root_pid, new_child);
        let root_pid = self.pf.end_pid();
        root.write(root_pid, &mut self.pf)?;
        self.root_pid = root_pid;
        self.tree_height += 1;
        debug!("new root {} at height {}", root_pid, self.tree_height);
        self.save_meta()
    }

    /// Descend to the leaf where an ordered scan for `key` begins. On an
    /// exact match the cursor points at its first occurrence and the flag
    /// is true; otherwise the cursor sits at the first entry with a
    /// larger key, possibly one past the end of the leaf. `EmptyTree`
    /// when nothing has been inserted yet.
    pub fn locate(&mut self, key: i32) -> DbResult<(IndexCursor, bool)> {
        if self.root_pid < 0 {
            return Err(DbError::EmptyTree);
        }

        // Descend to the leftmost candidate leaf. Insertion descends with
        // `locate_child_ptr` instead, so new duplicates land after their
        // equals; the scan descent must not skip the older copies a
        // duplicate-spanning separator leaves behind.
        let mut pid = self.root_pid;
        for _ in 1..self.tree_height {
            let node = NonLeafNode::read(pid, &mut self.pf)?;
            pid = node.locate_scan_child_ptr(key, pid)?;
        }

        let mut leaf = LeafNode::read(pid, &mut self.pf)?;
        let (mut eid, mut found) = leaf.locate(key);
        // Landing one leaf early puts the cursor past the end; the real
        // position is then at the head of a chained leaf.
        while eid == leaf.key_count() && leaf.next_ptr() > 0 {
            pid = leaf.next_ptr();
            leaf = LeafNode::read(pid, &mut self.pf)?;
            (eid, found) = leaf.locate(key);
        }
        Ok((IndexCursor { pid, eid }, found))
    }

    /// Read the entry under `cursor` and return it with the cursor for the
    /// following entry. A cursor sitting past the last entry of its leaf
    /// is moved to the next leaf first; `EndOfIndex` when there is none.
    pub fn read_forward(&mut self, cursor: IndexCursor) -> DbResult<(i32, RecordId, IndexCursor)> {
        let mut pid = cursor.pid;
        let mut eid = cursor.eid;
        if pid <= 0 {
            return Err(DbError::EndOfIndex);
        }

        let mut leaf = LeafNode::read(pid, &mut self.pf)?;
        while eid >= leaf.key_count() {
            pid = leaf.next_ptr();
            if pid <= 0 {
                return Err(DbError::EndOfIndex);
            }
            leaf = LeafNode::read(pid, &mut self.pf)?;
            eid = 0;
        }

        let (key, rid) = leaf.read_entry(eid)?;
        let next = if eid + 1 < leaf.key_count() {
            IndexCursor { pid, eid: eid + 1 }
        } else {
            IndexCursor { pid: leaf.next_ptr(), eid: 0 }
        };
        Ok((key, rid, next))
    }
}
