//! On-disk work-item ledger.
//!
//! A ledger is a UTF-8 text file with one item (normally a file path) per
//! line.  Lines starting with `#` are comments and blank lines are noise;
//! both are preserved on rewrite.  The literal line [`SENTINEL`] marks that
//! discovery finished writing the list.
//!
//! Removal is the only completion signal: an item still listed has not been
//! durably processed.  Every mutation reads the whole file, filters it and
//! writes it back through a sibling `.tmp` file plus `rename`, so a killed
//! process leaves either the old or the new ledger, never a torn one.
//!
//! # Single writer
//!
//! There is no file locking.  Exactly one process may mutate a given ledger
//! at a time; running two pipelines against the same work dir is an operator
//! error.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Marker line written after the last discovered item.
pub const SENTINEL: &str = "$$done$$";

// ---------------------------------------------------------------------------
// LedgerError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger exists but could not be read or rewritten.
    #[error("ledger I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LedgerError {
    fn io(path: &Path, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Snapshot of a ledger's interpretable content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    /// Pending items in file order, trimmed, sentinel excluded.
    pub items: Vec<String>,
    /// A sentinel line is present somewhere in the file.
    pub has_sentinel: bool,
    /// The first meaningful line is the sentinel: nothing is left to do.
    pub sentinel_first: bool,
}

impl Ledger {
    /// Parse ledger text.  Never fails; unknown content is treated as items.
    pub fn parse(content: &str) -> Self {
        let mut ledger = Ledger::default();
        let mut seen_meaningful = false;

        for line in content.lines().filter_map(meaningful) {
            if line == SENTINEL {
                ledger.has_sentinel = true;
                if !seen_meaningful {
                    ledger.sentinel_first = true;
                }
            } else {
                ledger.items.push(line.to_string());
            }
            seen_meaningful = true;
        }

        ledger
    }

    /// Read the ledger at `path`.
    ///
    /// A missing file is an empty ledger, not an error; callers create the
    /// file on first use.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    /// Rewrite `path` without any line equal to `item`.
    ///
    /// Every other line (comments, blanks and the sentinel included) keeps
    /// its relative order.  Returns `true` when at least one line was
    /// dropped; the file is left untouched otherwise.
    pub fn remove_item(path: &Path, item: &str) -> Result<bool, LedgerError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LedgerError::io(path, e)),
        };

        let item = item.trim();
        let mut kept = String::with_capacity(content.len());
        let mut removed = false;

        for line in content.lines() {
            if line.trim() == item {
                removed = true;
                continue;
            }
            kept.push_str(line);
            kept.push('\n');
        }

        if removed {
            write_atomic(path, &kept)?;
        }
        Ok(removed)
    }

    /// Overwrite `path` with `items` followed by the sentinel.
    pub fn repopulate<S: AsRef<str>>(path: &Path, items: &[S]) -> Result<(), LedgerError> {
        let mut content = String::new();
        for item in items {
            content.push_str(item.as_ref().trim());
            content.push('\n');
        }
        content.push_str(SENTINEL);
        content.push('\n');

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(path, e))?;
        }
        write_atomic(path, &content)
    }

    /// Create an empty ledger with a comment header if `path` is missing.
    ///
    /// Returns `true` when a new file was written.
    pub fn ensure(path: &Path) -> Result<bool, LedgerError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(path, e))?;
        }
        write_atomic(path, "# List image paths here, one per line\n")?;
        Ok(true)
    }

    /// Delete the ledger file.  Returns `true` when a file was removed.
    pub fn delete(path: &Path) -> Result<bool, LedgerError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Discovery completed and every item has since been removed.
    pub fn is_done(&self) -> bool {
        self.sentinel_first
    }
}

fn meaningful(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        None
    } else {
        Some(trimmed)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), LedgerError> {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content).map_err(|e| LedgerError::io(path, e))?;
    std::fs::rename(&tmp, path).map_err(|e| LedgerError::io(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    // ---- parse / load ---

    #[test]
    fn parse_skips_comments_and_blanks() {
        let ledger = Ledger::parse("# header\n\n/a.png\n  \n# note\n/b.png\n$$done$$\n");
        assert_eq!(ledger.items, vec!["/a.png", "/b.png"]);
        assert!(ledger.has_sentinel);
        assert!(!ledger.sentinel_first);
        assert!(!ledger.is_done());
    }

    #[test]
    fn sentinel_after_comments_counts_as_first() {
        let ledger = Ledger::parse("# header\n\n$$done$$\n");
        assert!(ledger.is_empty());
        assert!(ledger.sentinel_first);
        assert!(ledger.is_done());
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let ledger = Ledger::parse("  /a.png  \r\n");
        assert_eq!(ledger.items, vec!["/a.png"]);
    }

    #[test]
    fn load_missing_file_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(&dir.path().join("absent.txt")).unwrap();
        assert_eq!(ledger, Ledger::default());
    }

    #[test]
    fn load_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let err = Ledger::load(dir.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Io { .. }));
    }

    // ---- remove_item ---

    #[test]
    fn remove_item_preserves_order_of_everything_else() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "# header\n/a.png\n/b.png\n/c.png\n$$done$$\n");

        assert!(Ledger::remove_item(&path, "/b.png").unwrap());
        assert_eq!(read(&path), "# header\n/a.png\n/c.png\n$$done$$\n");
    }

    #[test]
    fn remove_item_drops_every_duplicate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "/a.png\n/b.png\n/a.png\n");

        Ledger::remove_item(&path, "/a.png").unwrap();
        assert_eq!(Ledger::load(&path).unwrap().items, vec!["/b.png"]);
    }

    #[test]
    fn remove_item_matches_trimmed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "  /a.png \n/b.png\n");

        assert!(Ledger::remove_item(&path, "/a.png").unwrap());
        assert_eq!(read(&path), "/b.png\n");
    }

    #[test]
    fn remove_absent_item_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "/a.png");

        assert!(!Ledger::remove_item(&path, "/zzz.png").unwrap());
        // No rewrite, so the missing trailing newline is still missing.
        assert_eq!(read(&path), "/a.png");
    }

    #[test]
    fn remove_from_missing_ledger_is_noop() {
        let dir = tempdir().unwrap();
        assert!(!Ledger::remove_item(&dir.path().join("none.txt"), "/a.png").unwrap());
    }

    #[test]
    fn removing_last_item_leaves_sentinel_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "/a.png\n$$done$$\n");

        Ledger::remove_item(&path, "/a.png").unwrap();
        assert!(Ledger::load(&path).unwrap().is_done());
    }

    // ---- repopulate / ensure / delete ---

    #[test]
    fn repopulate_writes_items_then_sentinel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.txt");

        Ledger::repopulate(&path, &["/a.png", "/b.png"]).unwrap();
        assert_eq!(read(&path), "/a.png\n/b.png\n$$done$$\n");

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.has_sentinel);
    }

    #[test]
    fn repopulate_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "/old.png\n");

        Ledger::repopulate(&path, &["/new.png"]).unwrap();
        assert_eq!(Ledger::load(&path).unwrap().items, vec!["/new.png"]);
        assert!(!dir.path().join("ledger.txt.tmp").exists());
    }

    #[test]
    fn repopulate_with_no_items_is_immediately_done() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        Ledger::repopulate::<&str>(&path, &[]).unwrap();
        assert!(Ledger::load(&path).unwrap().is_done());
    }

    #[test]
    fn ensure_creates_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");

        assert!(Ledger::ensure(&path).unwrap());
        write(&path, "/keep.png\n");
        assert!(!Ledger::ensure(&path).unwrap());
        assert_eq!(read(&path), "/keep.png\n");
    }

    #[test]
    fn delete_reports_whether_file_existed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        write(&path, "/a.png\n");

        assert!(Ledger::delete(&path).unwrap());
        assert!(!Ledger::delete(&path).unwrap());
        assert!(!path.exists());
    }
}
