use crate::{
    config::Config,
    error::{Error, Result},
};
use serde::Serialize;
use serde_json::Value;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::debug;

/// Indentation used for every artifact.
const INDENT: &[u8] = b"    ";

/// Filenames of the staged artifacts of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Profile Document (`{name}_raw.json`)
    pub raw: PathBuf,
    /// Cleaned Statistics Document (`{name}_cleaned.json`)
    pub cleaned: PathBuf,
    /// Shrunk Statistics Document (`{name}_shrinked.json`)
    pub shrunk: PathBuf,
    /// Enriched Document (`{name}_enriched.json`)
    pub enriched: PathBuf,
}

impl ArtifactPaths {
    /// Derives the artifact paths for run `name` inside `report_dir`.
    #[must_use]
    pub fn new(report_dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = report_dir.as_ref();
        Self {
            raw: dir.join(format!("{name}_raw.json")),
            cleaned: dir.join(format!("{name}_cleaned.json")),
            shrunk: dir.join(format!("{name}_shrinked.json")),
            enriched: dir.join(format!("{name}_enriched.json")),
        }
    }

    /// Derives the artifact paths from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.report_dir, &config.run_name)
    }
}

/// Reads and writes staged JSON artifacts.
///
/// Writes are atomic: content goes to a temporary file that is synced and
/// then renamed over the target, so a reader never sees a half-written
/// artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    backup_existing: bool,
}

impl ArtifactStore {
    /// Creates a store from configuration.
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self {
            backup_existing: config.backup_existing,
        }
    }

    /// Loads the artifact `stage` consumes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist ([`Error::MissingArtifact`])
    /// - The file cannot be read
    /// - The content is not valid JSON
    pub fn read(&self, stage: &str, path: &Path) -> Result<Value> {
        if !path.exists() {
            return Err(Error::missing_artifact(stage, path));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let value = serde_json::from_str(&content).map_err(|e| Error::json(path, &e))?;

        debug!("Loaded {} ({} bytes)", path.display(), content.len());
        Ok(value)
    }

    /// Serializes `value` with four-space indentation and writes it to
    /// `path`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn write<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let content = to_pretty_json(value)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        if path.exists() && self.backup_existing {
            backup_file(path)?;
        }

        write_file_atomic(path, &content)?;
        debug!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(())
    }
}

/// Serializes `value` as pretty JSON with four-space indentation.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    Ok(buffer)
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Writes content to a temporary file next to the target
/// 2. Syncs the temporary file to disk
/// 3. Renames the temporary file over the target path
pub(crate) fn write_file_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .sync_all()
        .map_err(|e| Error::io(&temp_path, e))?;

    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

    Ok(())
}

/// Creates a timestamped backup of an existing file.
fn backup_file(path: &Path) -> Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_nanos();

    let filename = path
        .file_name()
        .ok_or_else(|| Error::config("Invalid file path"))?
        .to_string_lossy();

    let backup_path = path.with_file_name(format!("{filename}.backup.{timestamp}"));

    fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

    debug!("Created backup: {}", backup_path.display());
    Ok(())
}
