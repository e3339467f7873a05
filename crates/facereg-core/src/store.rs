//! Flat-file identity store.
//!
//! One record per line: `name: [v1, v2, ...]`. The file is created on the
//! first append and rewritten in full on delete.

use crate::types::{Embedding, IdentityRecord};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Separator between the name and the serialized embedding.
pub const RECORD_DELIMITER: &str = ": ";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("corrupt record on line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Handle to the identity file. Holds only the path; every call re-reads disk.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read every record in file order.
    pub fn load(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let contents = self.read_contents()?;
        let mut records = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record =
                parse_record(line).map_err(|reason| StoreError::Corrupt { line: i + 1, reason })?;
            records.push(record);
        }
        Ok(records)
    }

    /// All stored names in file order, without parsing embeddings.
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        let contents = self.read_contents()?;
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| record_name(line).to_string())
            .collect())
    }

    /// Append one record, creating the file (and its parent directory) if needed.
    pub fn append(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        // A file edited by hand may lack its final newline.
        if file.seek(SeekFrom::End(0))? > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                writeln!(file)?;
            }
        }
        writeln!(file, "{}", format_record(record))?;
        file.flush()?;
        tracing::debug!(path = %self.path.display(), name = %record.name, "record appended");
        Ok(())
    }

    /// Drop every record whose name equals `name` exactly.
    ///
    /// Returns whether anything was removed. Other lines are written back
    /// untouched, in order, through a temporary file renamed over the store.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let contents = self.read_contents()?;

        let mut kept = Vec::new();
        let mut removed = 0usize;
        for line in contents.lines() {
            if !line.trim().is_empty() && record_name(line) == name {
                removed += 1;
            } else {
                kept.push(line);
            }
        }

        if removed == 0 {
            return Ok(false);
        }

        // Dropped (and deleted) on any error before persist.
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            for line in &kept {
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = %self.path.display(), name, removed, "records removed");
        Ok(true)
    }

    fn read_contents(&self) -> Result<String, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

/// Name portion of a line: everything before the first delimiter.
fn record_name(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']);
    line.split_once(RECORD_DELIMITER).map_or(line, |(name, _)| name)
}

/// Serialize a record as `name: [v1, v2, ...]`.
///
/// Floats use `{:?}` so every value parses back to the identical `f32`.
pub fn format_record(record: &IdentityRecord) -> String {
    let values: Vec<String> = record.embedding.values.iter().map(|v| format!("{v:?}")).collect();
    format!("{}{RECORD_DELIMITER}[{}]", record.name, values.join(", "))
}

/// Parse one `name: [v1, v2, ...]` line.
pub fn parse_record(line: &str) -> Result<IdentityRecord, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (name, vector) = line
        .split_once(RECORD_DELIMITER)
        .ok_or_else(|| format!("missing {RECORD_DELIMITER:?} delimiter"))?;

    let inner = vector
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| "embedding is not a bracketed list".to_string())?;

    let values = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner
            .split(',')
            .map(|v| {
                let v = v.trim();
                v.parse::<f32>().map_err(|e| format!("bad value {v:?}: {e}"))
            })
            .collect::<Result<Vec<f32>, String>>()?
    };

    Ok(IdentityRecord::new(name, Embedding::new(values)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, values: &[f32]) -> IdentityRecord {
        IdentityRecord::new(name, Embedding::new(values.to_vec()))
    }

    fn store_in(dir: &TempDir) -> IdentityStore {
        IdentityStore::new(dir.path().join("face_db.txt"))
    }

    #[test]
    fn test_format_record() {
        let line = format_record(&record("alice", &[1.0, -0.25, 0.5]));
        assert_eq!(line, "alice: [1.0, -0.25, 0.5]");
    }

    #[test]
    fn test_parse_record_python_style() {
        let r = parse_record("bob: [0.1, -2.5, 1e-07, 3]").unwrap();
        assert_eq!(r.name, "bob");
        assert_eq!(r.embedding.values, vec![0.1, -2.5, 1e-7, 3.0]);
    }

    #[test]
    fn test_parse_record_exact_values() {
        let original = record("carol", &[0.123_456_79, -1.0e-8, 12345.678]);
        let parsed = parse_record(&format_record(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_record_name_splits_on_first_delimiter() {
        let r = parse_record("dave: [1.0]").unwrap();
        assert_eq!(r.name, "dave");
        assert_eq!(record_name("eve: [1.0]: junk"), "eve");
    }

    #[test]
    fn test_parse_record_rejects_missing_delimiter() {
        assert!(parse_record("no delimiter here").is_err());
    }

    #[test]
    fn test_parse_record_rejects_bad_vector() {
        assert!(parse_record("x: 1.0, 2.0").is_err());
        assert!(parse_record("x: [1.0, nope]").is_err());
    }

    #[test]
    fn test_missing_store_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
        assert!(matches!(store.names(), Err(StoreError::NotFound(_))));
        assert!(matches!(store.remove("x"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_append_creates_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path().join("nested/dir/face_db.txt"));
        store.append(&record("alice", &[1.0, 2.0])).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), vec![record("alice", &[1.0, 2.0])]);
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&record("a", &[1.0])).unwrap();
        store.append(&record("b", &[2.0])).unwrap();
        store.append(&record("a", &[3.0])).unwrap();
        assert_eq!(store.names().unwrap(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_remove_exact_name_only() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&record("Al", &[1.0])).unwrap();
        store.append(&record("Alice", &[2.0])).unwrap();
        store.append(&record("Al", &[3.0])).unwrap();

        assert!(store.remove("Al").unwrap());
        assert_eq!(store.names().unwrap(), vec!["Alice"]);
        assert!(!store.remove("Al").unwrap());
    }

    #[test]
    fn test_remove_leaves_no_stray_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&record("alice", &[1.0])).unwrap();
        store.append(&record("bob", &[2.0])).unwrap();
        assert!(store.remove("alice").unwrap());

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("face_db.txt")]);
    }

    #[test]
    fn test_append_after_missing_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "alice: [1.0, 2.0]").unwrap();
        store.append(&record("bob", &[3.0, 4.0])).unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "alice: [1.0, 2.0]\nbob: [3.0, 4.0]\n"
        );
        assert_eq!(store.names().unwrap(), vec!["alice", "bob"]);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_append_to_empty_file_adds_no_blank_line() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "").unwrap();
        store.append(&record("bob", &[3.0])).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "bob: [3.0]\n");
    }

    #[test]
    fn test_remove_unknown_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&record("alice", &[1.0])).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();
        assert!(!store.remove("bob").unwrap());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "a: [1.0]\n\n   \nb: [2.0]\n").unwrap();
        assert_eq!(store.names().unwrap(), vec!["a", "b"]);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_load_reports_corrupt_line_number() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "a: [1.0]\ngarbage\n").unwrap();
        match store.load() {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "").unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(store.names().unwrap().is_empty());
    }
}
