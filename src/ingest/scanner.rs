//! Discovery of CSV snapshots on disk.
//!
//! A file argument is used as-is; a directory is walked recursively and
//! every `.csv` file below it is picked up, skipping hidden entries.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::IngestError;

const CSV_EXTENSION: &str = "csv";

/// Snapshot file scanner.
pub struct CsvScanner {
    root: PathBuf,
    max_depth: usize,
}

impl CsvScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: usize::MAX,
        }
    }

    /// Only descend `depth` levels below the root.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Every CSV file under the root, sorted by path.
    pub fn scan(&self) -> Result<Vec<PathBuf>, IngestError> {
        if !self.root.exists() {
            return Err(IngestError::Invalid(format!(
                "input path does not exist: {}",
                self.root.display()
            )));
        }

        if self.root.is_file() {
            if !is_csv(&self.root) {
                warn!("{} does not have a .csv extension", self.root.display());
            }
            return Ok(vec![self.root.clone()]);
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Cannot read directory entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() && is_csv(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        if files.is_empty() {
            return Err(IngestError::Invalid(format!(
                "no .csv files found in {}",
                self.root.display()
            )));
        }
        debug!("Found {} CSV files in {}", files.len(), self.root.display());
        Ok(files)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(CSV_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_tree(dir: &Path) {
        fs::create_dir_all(dir.join("2024/jan")).unwrap();
        fs::create_dir_all(dir.join(".cache")).unwrap();
        fs::write(dir.join("2024/jan/cpu.csv"), "Time\n").unwrap();
        fs::write(dir.join("2024/gpu.CSV"), "Time\n").unwrap();
        fs::write(dir.join("notes.txt"), "not data").unwrap();
        fs::write(dir.join(".cache/old.csv"), "Time\n").unwrap();
    }

    #[test]
    fn test_scan_directory() {
        let temp = TempDir::new().unwrap();
        create_tree(temp.path());

        let files = CsvScanner::new(temp.path()).scan().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["2024/gpu.CSV", "2024/jan/cpu.csv"]);
    }

    #[test]
    fn test_scan_respects_depth() {
        let temp = TempDir::new().unwrap();
        create_tree(temp.path());

        let files = CsvScanner::new(temp.path()).with_max_depth(2).scan().unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_scan_single_file() {
        let temp = TempDir::new().unwrap();
        create_tree(temp.path());
        let file = temp.path().join("2024/jan/cpu.csv");

        assert_eq!(CsvScanner::new(&file).scan().unwrap(), vec![file]);
    }

    #[test]
    fn test_scan_errors() {
        let temp = TempDir::new().unwrap();
        assert!(CsvScanner::new(temp.path().join("missing")).scan().is_err());
        assert!(CsvScanner::new(temp.path()).scan().is_err());
    }
}
