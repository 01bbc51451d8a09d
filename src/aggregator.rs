use crate::{
    config::Config,
    error::{Error, Result},
    table::Table,
};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Extension of files considered to be records.
const RECORD_EXTENSION: &str = "json";

/// Statistics collected during ingestion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregateStats {
    /// Record files considered (loaded or failed)
    pub files_seen: usize,

    /// Records loaded into the table
    pub records: usize,

    /// Directory entries ignored (wrong extension, not a file)
    pub skipped: usize,

    /// Record files that could not be read or parsed
    pub errors: usize,
}

/// Result of reading a record directory.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Flattened records
    pub table: Table,

    /// Ingestion counters
    pub stats: AggregateStats,
}

/// Reads JSON records from a directory into a [`Table`].
pub struct Aggregator {
    source_dir: PathBuf,
    file_limit: usize,
}

impl Aggregator {
    /// Creates a new aggregator from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            file_limit: config.file_limit,
        }
    }

    /// Reads up to `file_limit` records from the source directory.
    ///
    /// Entries are visited in the order the file system lists them. Files
    /// that fail to load are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the source directory cannot be listed.
    pub fn aggregate(&self) -> Result<Aggregation> {
        let mut table = Table::new();
        let mut stats = AggregateStats::default();

        debug!("Reading records from {}", self.source_dir.display());

        let walker = WalkDir::new(&self.source_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let message = e.to_string();
                    return Err(e.into_io_error().map_or_else(
                        || Error::config(message),
                        |io| Error::io(&self.source_dir, io),
                    ));
                }
                Err(e) => {
                    warn!("Walk error: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || !has_record_extension(entry.path()) {
                trace!("Ignoring {}", entry.path().display());
                stats.skipped += 1;
                continue;
            }

            if stats.records >= self.file_limit {
                info!("Reached file limit of {}. Stopping file processing.", self.file_limit);
                break;
            }

            stats.files_seen += 1;

            match Self::load_record(entry.path()) {
                Ok(record) => {
                    table.push_record(&record);
                    stats.records += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    stats.errors += 1;
                }
            }
        }

        debug!(
            "Ingestion complete: {} records, {} errors, {} skipped entries",
            stats.records, stats.errors, stats.skipped
        );

        if stats.errors > 0 {
            warn!(
                "Encountered {} errors while reading records (non-fatal)",
                stats.errors
            );
        }

        Ok(Aggregation { table, stats })
    }

    /// Reads and parses a single record file.
    fn load_record(path: &Path) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(record)) => Ok(record),
            Ok(other) => Err(Error::Json {
                path: path.to_path_buf(),
                message: format!("expected a JSON object, found {}", kind_name(&other)),
            }),
            Err(e) => Err(Error::json(path, &e)),
        }
    }
}

fn has_record_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORD_EXTENSION))
}

const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn create_test_config(root: &Path, limit: usize) -> Config {
        Config::builder()
            .source_dir(root)
            .file_limit(limit)
            .build()
            .unwrap()
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.json").write_str(r#"{"title": "Dev"}"#).unwrap();
        temp.child("b.json").write_str(r#"{"title": "Ops"}"#).unwrap();
        temp.child("c.json").write_str(r#"{"title": "QA"}"#).unwrap();
        temp.child("broken.json").write_str(r#"{"title": "#).unwrap();

        let aggregation = Aggregator::new(&create_test_config(temp.path(), 10))
            .aggregate()
            .unwrap();

        assert_eq!(aggregation.stats.records, 3);
        assert_eq!(aggregation.stats.errors, 1);
        assert_eq!(aggregation.stats.files_seen, 4);
        assert_eq!(aggregation.table.len(), 3);
    }

    #[test]
    fn test_only_json_files_are_read() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("listing.json").write_str(r#"{"id": 1}"#).unwrap();
        temp.child("UPPER.JSON").write_str(r#"{"id": 2}"#).unwrap();
        temp.child("notes.txt").write_str("not a record").unwrap();
        temp.child("nested/inner.json").write_str(r#"{"id": 3}"#).unwrap();

        let aggregation = Aggregator::new(&create_test_config(temp.path(), 10))
            .aggregate()
            .unwrap();

        assert_eq!(aggregation.stats.records, 2);
        assert_eq!(aggregation.stats.skipped, 2);
    }

    #[test]
    fn test_file_limit_stops_ingestion() {
        let temp = assert_fs::TempDir::new().unwrap();
        for i in 0..5 {
            temp.child(format!("{i}.json"))
                .write_str(&format!(r#"{{"id": {i}}}"#))
                .unwrap();
        }

        let aggregation = Aggregator::new(&create_test_config(temp.path(), 2))
            .aggregate()
            .unwrap();

        assert_eq!(aggregation.stats.records, 2);
        assert_eq!(aggregation.table.len(), 2);
    }

    #[test]
    fn test_non_object_record_is_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("list.json").write_str("[1, 2, 3]").unwrap();

        let aggregation = Aggregator::new(&create_test_config(temp.path(), 10))
            .aggregate()
            .unwrap();

        assert_eq!(aggregation.stats.records, 0);
        assert_eq!(aggregation.stats.errors, 1);
        assert!(aggregation.table.is_empty());
    }

    #[test]
    fn test_empty_directory_yields_empty_table() {
        let temp = assert_fs::TempDir::new().unwrap();

        let aggregation = Aggregator::new(&create_test_config(temp.path(), 10))
            .aggregate()
            .unwrap();

        assert!(aggregation.table.is_empty());
        assert_eq!(aggregation.stats, AggregateStats::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_record_is_loaded() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("elsewhere/record.json");
        target.write_str(r#"{"title": "Dev"}"#).unwrap();

        let listings = temp.child("listings");
        listings.create_dir_all().unwrap();
        std::os::unix::fs::symlink(target.path(), listings.child("link.json").path()).unwrap();

        let aggregation = Aggregator::new(&create_test_config(listings.path(), 10))
            .aggregate()
            .unwrap();

        assert_eq!(aggregation.stats.records, 1);
        assert_eq!(aggregation.stats.skipped, 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let config = create_test_config(Path::new("/nonexistent/records/dir"), 10);
        assert!(Aggregator::new(&config).aggregate().is_err());
    }
}
