//! Per-column statistics over a [`Table`].
//!
//! The pipeline only depends on the [`Profiler`] trait and the shape of the
//! document it returns: `{"analysis": …, "table": …, "variables": {column →
//! statistics}}`. [`BasicProfiler`] is the built-in implementation.

use crate::{error::Result, table::Table};
use serde_json::{json, Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// Largest number of distinct strings a column may have to be categorical.
const CATEGORICAL_MAX_DISTINCT: usize = 50;

/// Distinct ratio a categorical column must stay below.
const CATEGORICAL_MAX_DISTINCT_RATIO: f64 = 0.5;

/// Type tag assigned to a profiled column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Numbers only
    Numeric,
    /// Booleans only
    Boolean,
    /// Strings drawn from a small set of values
    Categorical,
    /// Free-form strings
    Text,
    /// Anything else
    Unsupported,
}

impl ColumnKind {
    /// Returns the tag written into the statistics document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "Numeric",
            Self::Boolean => "Boolean",
            Self::Categorical => "Categorical",
            Self::Text => "Text",
            Self::Unsupported => "Unsupported",
        }
    }

    /// Parses a type tag. Unknown tags map to [`ColumnKind::Unsupported`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Numeric" => Self::Numeric,
            "Boolean" => Self::Boolean,
            "Categorical" => Self::Categorical,
            "Text" => Self::Text,
            _ => Self::Unsupported,
        }
    }
}

/// Produces a Profile Document from a table.
pub trait Profiler {
    /// Profiles every column of `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statistics cannot be computed.
    fn profile(&self, table: &Table) -> Result<Value>;
}

/// Built-in profiler computing counts, missingness, distributions and
/// numeric summaries.
#[derive(Debug, Clone)]
pub struct BasicProfiler {
    title: String,
}

impl BasicProfiler {
    /// Creates a profiler whose report carries `title`.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for BasicProfiler {
    fn default() -> Self {
        Self::new("Profiling Report")
    }
}

impl Profiler for BasicProfiler {
    #[instrument(skip_all, fields(rows = table.len(), columns = table.columns().len()))]
    fn profile(&self, table: &Table) -> Result<Value> {
        let date_start = chrono::Local::now();

        let mut variables = Map::new();
        let mut type_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut cells_missing = 0usize;

        for column in table.columns() {
            let values: Vec<Option<&Value>> = table.column_values(column).collect();
            let (kind, stats) = describe_column(&values);

            debug!("Column '{}' profiled as {}", column, kind.as_str());
            *type_counts.entry(kind.as_str()).or_default() += 1;
            cells_missing += values.iter().filter(|v| v.is_none()).count();
            variables.insert(column.clone(), Value::Object(stats));
        }

        let n = table.len();
        let n_var = table.columns().len();
        let total_cells = n * n_var;

        Ok(json!({
            "analysis": {
                "title": self.title,
                "date_start": date_start.to_rfc3339(),
                "date_end": chrono::Local::now().to_rfc3339(),
            },
            "table": {
                "n": n,
                "n_var": n_var,
                "n_cells_missing": cells_missing,
                "p_cells_missing": ratio(cells_missing, total_cells),
                "types": type_counts,
            },
            "variables": variables,
        }))
    }
}

/// Computes the statistics map of one column.
fn describe_column(values: &[Option<&Value>]) -> (ColumnKind, Map<String, Value>) {
    let present: Vec<&Value> = values.iter().filter_map(|v| *v).collect();
    let n = values.len();
    let count = present.len();
    let n_missing = n - count;

    let counts = value_counts(&present);
    let n_distinct = counts.len();
    let p_distinct = ratio(n_distinct, count);
    let kind = infer_kind(&present, n_distinct, p_distinct.as_f64().unwrap_or(1.0));

    let mut stats = Map::new();
    stats.insert("type".into(), Value::from(kind.as_str()));
    stats.insert("n".into(), Value::from(n));
    stats.insert("count".into(), Value::from(count));
    stats.insert("n_missing".into(), Value::from(n_missing));
    stats.insert("p_missing".into(), ratio(n_missing, n));
    stats.insert("n_distinct".into(), Value::from(n_distinct));
    stats.insert("p_distinct".into(), p_distinct);
    stats.insert("is_unique".into(), Value::from(count > 0 && n_distinct == count));

    let mut distribution = Map::new();
    for (key, occurrences) in counts {
        distribution.insert(key, Value::from(occurrences));
    }
    stats.insert("value_counts_without_nan".into(), Value::Object(distribution));

    match kind {
        ColumnKind::Numeric => numeric_summary(&present, &mut stats),
        ColumnKind::Text | ColumnKind::Categorical => length_summary(&present, &mut stats),
        ColumnKind::Boolean | ColumnKind::Unsupported => {}
    }

    (kind, stats)
}

fn infer_kind(present: &[&Value], n_distinct: usize, p_distinct: f64) -> ColumnKind {
    if present.is_empty() {
        return ColumnKind::Unsupported;
    }

    if present.iter().all(|v| v.is_boolean()) {
        ColumnKind::Boolean
    } else if present.iter().all(|v| v.is_number()) {
        ColumnKind::Numeric
    } else if present.iter().all(|v| v.is_string()) {
        if n_distinct <= CATEGORICAL_MAX_DISTINCT && p_distinct < CATEGORICAL_MAX_DISTINCT_RATIO {
            ColumnKind::Categorical
        } else {
            ColumnKind::Text
        }
    } else {
        ColumnKind::Unsupported
    }
}

/// Occurrence counts keyed by value text, most frequent first. Ties keep
/// the order of first appearance.
fn value_counts(present: &[&Value]) -> Vec<(String, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for value in present {
        let key = value_text(value);
        match index.get(&key) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(key.clone(), counts.len());
                counts.push((key, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Text form of a value as used for distribution keys.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_summary(present: &[&Value], stats: &mut Map<String, Value>) {
    let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
    if numbers.is_empty() {
        return;
    }

    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = numbers.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let len = numbers.len() as f64;
    let mean = sum / len;

    stats.insert("min".into(), float(min));
    stats.insert("max".into(), float(max));
    stats.insert("mean".into(), float(mean));
    if numbers.len() > 1 {
        let variance = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (len - 1.0);
        stats.insert("std".into(), float(variance.sqrt()));
    }
    stats.insert("sum".into(), float(sum));
    stats.insert("range".into(), float(max - min));
}

fn length_summary(present: &[&Value], stats: &mut Map<String, Value>) {
    let lengths: Vec<usize> = present
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.chars().count())
        .collect();
    let (Some(&min), Some(&max)) = (lengths.iter().min(), lengths.iter().max()) else {
        return;
    };
    let total: usize = lengths.iter().sum();

    stats.insert("max_length".into(), Value::from(max));
    stats.insert("min_length".into(), Value::from(min));
    stats.insert("mean_length".into(), ratio(total, lengths.len()));
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> Value {
    if whole == 0 {
        return float(0.0);
    }
    float(part as f64 / whole as f64)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
