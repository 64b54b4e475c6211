use oakdb::error::DbError;
use oakdb::index::tree::BTreeIndex;
use oakdb::storage::pagefile::OpenMode;
use oakdb::storage::recordfile::RecordId;
use tempfile::tempdir;

fn rid(n: i32) -> RecordId {
    RecordId { pid: n / 10, sid: n % 10 }
}

/// Drain the whole index in key order starting from `key`.
fn scan_from(tree: &mut BTreeIndex, key: i32) -> Vec<(i32, RecordId)> {
    let (mut cursor, _) = tree.locate(key).unwrap();
    let mut out = Vec::new();
    loop {
        match tree.read_forward(cursor) {
            Ok((k, r, next)) => {
                out.push((k, r));
                cursor = next;
            }
            Err(DbError::EndOfIndex) => break,
            Err(e) => panic!("scan failed: {}", e),
        }
    }
    out
}

#[test]
fn first_insert_creates_leaf_root() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();

    tree.insert(216, RecordId { pid: 0, sid: 1 }).unwrap();
    assert_eq!(tree.tree_height(), 1);

    let (cursor, found) = tree.locate(216).unwrap();
    assert!(found);
    let (key, r, _) = tree.read_forward(cursor).unwrap();
    assert_eq!((key, r), (216, RecordId { pid: 0, sid: 1 }));
}

#[test]
fn locate_on_empty_tree_is_empty_tree() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();
    assert!(matches!(tree.locate(1), Err(DbError::EmptyTree)));
}

#[test]
fn sequential_inserts_scan_ascending() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();

    let keys: Vec<i32> = (0..81).map(|i| 100 + 2 * i).collect();
    for &key in &keys {
        tree.insert(key, rid(key)).unwrap();
    }

    let scanned: Vec<i32> = scan_from(&mut tree, i32::MIN).iter().map(|&(k, _)| k).collect();
    assert_eq!(scanned, keys);
}

#[test]
fn shuffled_inserts_split_and_stay_ordered() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();

    // 37 is coprime to 2000, so this visits every key exactly once.
    let n = 2000;
    let mut height = 0;
    for i in 0..n {
        let key = (i * 37) % n;
        tree.insert(key, rid(key)).unwrap();

        // Height never regresses and grows one level at a time.
        assert!(tree.tree_height() >= height);
        assert!(tree.tree_height() <= height + 1);
        height = tree.tree_height();
    }
    assert!(tree.tree_height() >= 2);

    let scanned = scan_from(&mut tree, i32::MIN);
    assert_eq!(scanned.len(), n as usize);
    for (i, &(key, r)) in scanned.iter().enumerate() {
        assert_eq!(key, i as i32);
        assert_eq!(r, rid(key));
    }

    // Round trip: every key is found where locate says it is.
    for key in 0..n {
        let (cursor, found) = tree.locate(key).unwrap();
        assert!(found, "key {} not found", key);
        let (k, r, _) = tree.read_forward(cursor).unwrap();
        assert_eq!(k, key);
        assert_eq!(r, rid(key));
    }
}

#[test]
fn deep_tree_grows_to_height_three() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();

    let n = 12_000;
    for key in 0..n {
        tree.insert(key, rid(key)).unwrap();
    }
    assert!(tree.tree_height() >= 3, "height was {}", tree.tree_height());

    let scanned = scan_from(&mut tree, i32::MIN);
    assert_eq!(scanned.len(), n as usize);
    assert!(scanned.windows(2).all(|w| w[0].0 < w[1].0));

    for key in [0, 1, 4242, n - 1] {
        let (cursor, found) = tree.locate(key).unwrap();
        assert!(found);
        assert_eq!(tree.read_forward(cursor).unwrap().0, key);
    }
}

#[test]
fn duplicate_keys_keep_all_locators_in_insertion_order() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();

    for key in 0..200 {
        tree.insert(key, rid(key)).unwrap();
    }
    let dups: Vec<RecordId> = (0..5).map(|i| RecordId { pid: 90, sid: i }).collect();
    for &r in &dups {
        tree.insert(42, r).unwrap();
    }

    let (mut cursor, found) = tree.locate(42).unwrap();
    assert!(found);
    let mut seen = Vec::new();
    loop {
        let (key, r, next) = tree.read_forward(cursor).unwrap();
        if key != 42 {
            break;
        }
        seen.push(r);
        cursor = next;
    }
    assert_eq!(seen.len(), 6);
    assert_eq!(seen[0], rid(42));
    assert_eq!(&seen[1..], &dups[..]);
}

#[test]
fn duplicates_overflowing_one_leaf_all_survive() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();

    for key in 0..50 {
        tree.insert(key, rid(key)).unwrap();
    }
    // Far more copies of one key than a single leaf can hold, so whole
    // leaves of 7s split and the separator itself repeats the key.
    let dups: Vec<RecordId> = (0..200).map(|i| RecordId { pid: 777, sid: i }).collect();
    for &r in &dups {
        tree.insert(7, r).unwrap();
    }

    let (mut cursor, found) = tree.locate(7).unwrap();
    assert!(found);
    let mut seen = Vec::new();
    loop {
        let (key, r, next) = tree.read_forward(cursor).unwrap();
        if key != 7 {
            break;
        }
        seen.push(r);
        cursor = next;
    }
    assert_eq!(seen.len(), 201);
    assert_eq!(seen[0], rid(7));
    assert_eq!(&seen[1..], &dups[..]);

    // The rest of the tree is intact and still in order.
    let scanned = scan_from(&mut tree, i32::MIN);
    assert_eq!(scanned.len(), 250);
    assert!(scanned.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn read_mode_session_closes_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.idx");
    {
        let mut tree = BTreeIndex::open(&path, OpenMode::Write).unwrap();
        for key in 0..10 {
            tree.insert(key, rid(key)).unwrap();
        }
        tree.close().unwrap();
    }

    // A read session never writes, not even metadata at close.
    let mut tree = BTreeIndex::open(&path, OpenMode::Read).unwrap();
    let (cursor, found) = tree.locate(4).unwrap();
    assert!(found);
    assert_eq!(tree.read_forward(cursor).unwrap().0, 4);
    tree.close().unwrap();
}

#[test]
fn miss_positions_cursor_before_next_larger_key() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();
    for key in [1, 5, 10] {
        tree.insert(key, rid(key)).unwrap();
    }

    let (cursor, found) = tree.locate(7).unwrap();
    assert!(!found);
    let (key, _, _) = tree.read_forward(cursor).unwrap();
    assert_eq!(key, 10);

    // Everything before the cursor is strictly smaller.
    let (start, _) = tree.locate(i32::MIN).unwrap();
    let (first, _, next) = tree.read_forward(start).unwrap();
    let (second, _, _) = tree.read_forward(next).unwrap();
    assert!(first < 7 && second < 7);
}

#[test]
fn miss_past_the_last_key_hits_end_of_index() {
    let dir = tempdir().unwrap();
    let mut tree = BTreeIndex::open(dir.path().join("t.idx"), OpenMode::Write).unwrap();
    for key in [1, 5, 10] {
        tree.insert(key, rid(key)).unwrap();
    }

    let (cursor, found) = tree.locate(999).unwrap();
    assert!(!found);
    assert!(matches!(tree.read_forward(cursor), Err(DbError::EndOfIndex)));
}

#[test]
fn metadata_survives_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.idx");
    let (root, height) = {
        let mut tree = BTreeIndex::open(&path, OpenMode::Write).unwrap();
        for key in 0..500 {
            tree.insert(key, rid(key)).unwrap();
        }
        let snapshot = (tree.root_pid(), tree.tree_height());
        tree.close().unwrap();
        snapshot
    };
    assert!(height >= 2);

    let mut tree = BTreeIndex::open(&path, OpenMode::Read).unwrap();
    assert_eq!(tree.root_pid(), root);
    assert_eq!(tree.tree_height(), height);
    let (cursor, found) = tree.locate(321).unwrap();
    assert!(found);
    assert_eq!(tree.read_forward(cursor).unwrap().0, 321);
}

#[test]
fn root_changes_are_persisted_without_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.idx");
    {
        let mut tree = BTreeIndex::open(&path, OpenMode::Write).unwrap();
        for key in 0..500 {
            tree.insert(key, rid(key)).unwrap();
        }
        // Dropped without close(): the session aborted, but every root
        // change was checkpointed to page 0 as it happened.
    }

    let mut tree = BTreeIndex::open(&path, OpenMode::Read).unwrap();
    assert!(tree.tree_height() >= 2);
    let scanned = scan_from(&mut tree, i32::MIN);
    assert_eq!(scanned.len(), 500);
}

#[test]
fn fresh_index_file_opens_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.idx");
    {
        let tree = BTreeIndex::open(&path, OpenMode::Write).unwrap();
        assert_eq!(tree.root_pid(), -1);
        assert_eq!(tree.tree_height(), 0);
        tree.close().unwrap();
    }
    let mut tree = BTreeIndex::open(&path, OpenMode::Read).unwrap();
    assert_eq!(tree.tree_height(), 0);
    assert!(matches!(tree.locate(1), Err(DbError::EmptyTree)));
}

#[test]
fn inconsistent_metadata_is_rejected() {
    use oakdb::storage::pagefile::{Page, PageFile};

    let dir = tempdir().unwrap();
    let path = dir.path().join("t.idx");
    {
        let mut pf = PageFile::open(&path, OpenMode::Write).unwrap();
        let mut meta = Page::new();
        meta.set_i32(0, -1); // no root …
        meta.set_i32(4, 3); // … but a positive height
        pf.write(0, &meta).unwrap();
        pf.close().unwrap();
    }
    assert!(matches!(
        BTreeIndex::open(&path, OpenMode::Read),
        Err(DbError::CorruptMetadata)
    ));
}
