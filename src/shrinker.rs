//! Type-dependent truncation of value-count distributions.
//!
//! Distributions arrive ordered by descending frequency, so keeping a prefix
//! keeps the most frequent values. Whenever entries are dropped the result
//! ends with [`SENTINEL_KEY`] mapped to [`SENTINEL_VALUE`].

use crate::{profiler::ColumnKind, projector::StatsDocument};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Key of the entry marking that values were left out.
pub const SENTINEL_KEY: &str = "more ...";

/// Count stored under [`SENTINEL_KEY`].
pub const SENTINEL_VALUE: i64 = -1;

const DISTRIBUTION_KEY: &str = "value_counts_without_nan";
const TYPE_KEY: &str = "type";

/// Limits applied while shrinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkConfig {
    /// Maximum number of entries kept (sentinel excluded)
    pub max_keys: usize,
    /// Character budget over the kept keys of text columns
    pub max_chars_for_text: usize,
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        Self {
            max_keys: 10,
            max_chars_for_text: 1_000,
        }
    }
}

/// What happened to one column's distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShrink {
    /// Column name
    pub column: String,
    /// Entries before shrinking
    pub original: usize,
    /// Entries after shrinking, sentinel excluded
    pub kept: usize,
}

impl ColumnShrink {
    /// Returns true if entries were dropped.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.kept < self.original
    }
}

/// Outcome of shrinking a whole document.
#[derive(Debug, Clone, Default)]
pub struct ShrinkReport {
    /// Columns that carried a type and a distribution
    pub columns: Vec<ColumnShrink>,
}

impl ShrinkReport {
    /// Number of columns whose distribution was truncated.
    #[must_use]
    pub fn truncated_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.truncated()).count()
    }
}

/// Shrinks one distribution according to the column kind.
///
/// - Categorical: returned unchanged.
/// - Text: entries are admitted in order while fewer than `max_keys` are
///   kept and the summed key length stays within `max_chars_for_text`. The
///   first entry is always admitted.
/// - Anything else: the first `max_keys` entries are kept.
///
/// Non-categorical results that lost entries end with the sentinel.
#[must_use]
pub fn shrink_distribution(
    kind: ColumnKind,
    distribution: &Map<String, Value>,
    config: &ShrinkConfig,
) -> Map<String, Value> {
    shrink_counted(kind, distribution, config).0
}

/// Same as [`shrink_distribution`], also returning the number of entries
/// kept (sentinel excluded).
fn shrink_counted(
    kind: ColumnKind,
    distribution: &Map<String, Value>,
    config: &ShrinkConfig,
) -> (Map<String, Value>, usize) {
    let mut shrunk = match kind {
        ColumnKind::Categorical => return (distribution.clone(), distribution.len()),
        ColumnKind::Text => take_within_budget(distribution, config),
        ColumnKind::Numeric | ColumnKind::Boolean | ColumnKind::Unsupported => distribution
            .iter()
            .take(config.max_keys)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };

    let kept = shrunk.len();
    if kept < distribution.len() {
        shrunk.insert(SENTINEL_KEY.to_string(), Value::from(SENTINEL_VALUE));
    }

    (shrunk, kept)
}

fn take_within_budget(distribution: &Map<String, Value>, config: &ShrinkConfig) -> Map<String, Value> {
    let mut kept = Map::new();
    let mut chars = 0usize;

    for (key, value) in distribution {
        if kept.len() >= config.max_keys {
            break;
        }

        let len = key.chars().count();
        if !kept.is_empty() && chars + len > config.max_chars_for_text {
            break;
        }

        kept.insert(key.clone(), value.clone());
        chars += len;
    }

    kept
}

/// Shrinks every column of a cleaned statistics document in place.
///
/// Columns lacking a string `type` or an object distribution are left
/// untouched.
pub fn shrink_document(document: &mut StatsDocument, config: &ShrinkConfig) -> ShrinkReport {
    let mut report = ShrinkReport::default();

    for (column, stats) in document.iter_mut() {
        let Some(stats) = stats.as_object_mut() else {
            continue;
        };

        let Some(kind) = stats.get(TYPE_KEY).and_then(Value::as_str).map(ColumnKind::from_tag) else {
            trace!("Column '{}' has no type, leaving it as is", column);
            continue;
        };

        let Some(Value::Object(distribution)) = stats.get(DISTRIBUTION_KEY) else {
            trace!("Column '{}' has no distribution, leaving it as is", column);
            continue;
        };

        let original = distribution.len();
        let (shrunk, kept) = shrink_counted(kind, distribution, config);

        if kept < original {
            debug!("Column '{}': kept {} of {} values", column, kept, original);
        }

        stats.insert(DISTRIBUTION_KEY.to_string(), Value::Object(shrunk));
        report.columns.push(ColumnShrink {
            column: column.clone(),
            original,
            kept,
        });
    }

    report
}
