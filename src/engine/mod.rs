use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{DbError, DbResult};
use crate::index::tree::BTreeIndex;
use crate::sql::ast::{CompOp, CondAttr, Condition, SelectAttr, Statement};
use crate::storage::pagefile::OpenMode;
use crate::storage::recordfile::{RecordFile, RecordId};

/// Result of one executed statement, for the REPL to print.
pub enum ExecResult {
    Rows(SelectAttr, Vec<(i32, String)>),
    Loaded(usize),
    Quit,
}

/// Scan window over keys derived from the WHERE clause: an inclusive
/// lower bound and an upper bound with its own inclusivity. `None` bounds
/// are unconstrained.
struct KeyWindow {
    lower: Option<i32>,
    upper: Option<(i32, bool)>,
    bounded: bool,
    empty: bool,
}

/// SqlEngine: executes LOAD and SELECT against table files in one data
/// directory. A table `t` lives in `t.tbl` (record file) and optionally
/// `t.idx` (B+-tree over the keys).
pub struct SqlEngine {
    dir: PathBuf,
}

impl SqlEngine {
    pub fn new<P: AsRef<Path>>(dir: P) -> SqlEngine {
        SqlEngine { dir: dir.as_ref().to_path_buf() }
    }

    pub fn execute(&self, stmt: Statement) -> DbResult<ExecResult> {
        match stmt {
            Statement::Select { attr, table, conds } => {
                let rows = self.select(&table, &conds)?;
                Ok(ExecResult::Rows(attr, rows))
            }
            Statement::Load { table, file, with_index } => {
                let count = self.load(&table, &file, with_index)?;
                Ok(ExecResult::Loaded(count))
            }
            Statement::Quit => Ok(ExecResult::Quit),
        }
    }

    /// Bulk-load `key,value` lines from `loadfile` into the table,
    /// appending every tuple to the record file and, with `with_index`,
    /// inserting each (key, rid) pair into the table's index.
    pub fn load(&self, table: &str, loadfile: &str, with_index: bool) -> DbResult<usize> {
        let mut rf = RecordFile::open(self.table_path(table), OpenMode::Write)?;
        let mut index = if with_index {
            Some(BTreeIndex::open(self.index_path(table), OpenMode::Write)?)
        } else {
            None
        };

        let reader = BufReader::new(File::open(loadfile)?);
        let mut count = 0;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = parse_load_line(&line, lineno + 1)?;
            let rid = rf.append(key, &value)?;
            if let Some(ref mut tree) = index {
                tree.insert(key, rid)?;
            }
            count += 1;
        }

        if let Some(tree) = index {
            tree.close()?;
        }
        rf.close()?;
        info!("loaded {} tuples into table '{}'", count, table);
        Ok(count)
    }

    /// Run a SELECT and return the matching tuples in scan order. Uses the
    /// table's index when it exists and the WHERE clause pins down a key
    /// window; otherwise scans the record file front to back.
    pub fn select(&self, table: &str, conds: &[Condition]) -> DbResult<Vec<(i32, String)>> {
        let mut rf = match RecordFile::open(self.table_path(table), OpenMode::Read) {
            Ok(rf) => rf,
            Err(DbError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DbError::TableNotFound(table.to_string()));
            }
            Err(e) => return Err(e),
        };

        let window = key_window(conds)?;
        if window.empty {
            return Ok(Vec::new());
        }

        if window.bounded && self.index_path(table).exists() {
            debug!("select on '{}' via index", table);
            return self.select_via_index(table, &mut rf, conds, &window);
        }

        debug!("select on '{}' via full scan", table);
        let mut rows = Vec::new();
        let mut rid = RecordId::default();
        while rid < rf.end_rid() {
            let (key, value) = rf.read(rid)?;
            if matches(conds, key, &value)? {
                rows.push((key, value));
            }
            rid = RecordFile::next_rid(rid);
        }
        Ok(rows)
    }

    fn select_via_index(
        &self,
        table: &str,
        rf: &mut RecordFile,
        conds: &[Condition],
        window: &KeyWindow,
    ) -> DbResult<Vec<(i32, String)>> {
        let mut tree = BTreeIndex::open(self.index_path(table), OpenMode::Read)?;

        let start = window.lower.unwrap_or(i32::MIN);
        let mut cursor = match tree.locate(start) {
            Ok((cursor, _)) => cursor,
            Err(DbError::EmptyTree) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut rows = Vec::new();
        loop {
            let (key, rid, next) = match tree.read_forward(cursor) {
                Ok(entry) => entry,
                Err(DbError::EndOfIndex) => break,
                Err(e) => return Err(e),
            };
            if let Some((upper, inclusive)) = window.upper {
                if key > upper || (key == upper && !inclusive) {
                    break;
                }
            }
            let (tuple_key, value) = rf.read(rid)?;
            if matches(conds, tuple_key, &value)? {
                rows.push((tuple_key, value));
            }
            cursor = next;
        }
        tree.close()?;
        Ok(rows)
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.tbl", table))
    }

    fn index_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.idx", table))
    }
}

/// Parse one `key,value` load line: optional leading whitespace, integer
/// key, comma, value optionally wrapped in single or double quotes.
pub fn parse_load_line(line: &str, lineno: usize) -> DbResult<(i32, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let comma = line.find(',').ok_or(DbError::InvalidLoadLine(lineno))?;
    let key = line[..comma]
        .trim()
        .parse::<i32>()
        .map_err(|_| DbError::InvalidLoadLine(lineno))?;

    let rest = line[comma + 1..].trim_start();
    let value = match rest.chars().next() {
        None => String::new(),
        Some(q @ ('\'' | '"')) => {
            let body = &rest[1..];
            match body.find(q) {
                Some(end) => body[..end].to_string(),
                None => body.to_string(),
            }
        }
        Some(_) => rest.to_string(),
    };
    Ok((key, value))
}

fn parse_key_literal(cond: &Condition) -> DbResult<i32> {
    cond.value
        .parse::<i32>()
        .map_err(|_| DbError::ParseError(format!("key literal '{}' is not an integer", cond.value)))
}

/// Fold all key conditions into one contiguous scan window. `<>` does not
/// narrow the window; it is applied per tuple like value conditions.
fn key_window(conds: &[Condition]) -> DbResult<KeyWindow> {
    let mut window = KeyWindow { lower: None, upper: None, bounded: false, empty: false };

    for cond in conds.iter().filter(|c| c.attr == CondAttr::Key) {
        let v = parse_key_literal(cond)?;
        match cond.op {
            CompOp::Eq => {
                raise_lower(&mut window.lower, v);
                drop_upper(&mut window.upper, (v, true));
                window.bounded = true;
            }
            CompOp::Ge => {
                raise_lower(&mut window.lower, v);
                window.bounded = true;
            }
            CompOp::Gt => {
                match v.checked_add(1) {
                    Some(lo) => raise_lower(&mut window.lower, lo),
                    None => window.empty = true,
                }
                window.bounded = true;
            }
            CompOp::Le => {
                drop_upper(&mut window.upper, (v, true));
                window.bounded = true;
            }
            CompOp::Lt => {
                drop_upper(&mut window.upper, (v, false));
                window.bounded = true;
            }
            CompOp::Ne => {}
        }
    }

    if let (Some(lo), Some((hi, inclusive))) = (window.lower, window.upper) {
        if lo > hi || (lo == hi && !inclusive) {
            window.empty = true;
        }
    }
    Ok(window)
}

fn raise_lower(lower: &mut Option<i32>, v: i32) {
    *lower = Some(lower.map_or(v, |cur| cur.max(v)));
}

fn drop_upper(upper: &mut Option<(i32, bool)>, bound: (i32, bool)) {
    *upper = Some(match *upper {
        None => bound,
        Some(cur) => {
            // Tighter key wins; at equal keys the exclusive bound wins.
            match bound.0.cmp(&cur.0) {
                Ordering::Less => bound,
                Ordering::Greater => cur,
                Ordering::Equal => (cur.0, cur.1 && bound.1),
            }
        }
    });
}

fn matches(conds: &[Condition], key: i32, value: &str) -> DbResult<bool> {
    for cond in conds {
        let ord = match cond.attr {
            CondAttr::Key => key.cmp(&parse_key_literal(cond)?),
            CondAttr::Value => value.cmp(cond.value.as_str()),
        };
        if !cond.op.accepts(ord) {
            return Ok(false);
        }
    }
    Ok(true)
}
