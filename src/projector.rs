//! Reduces a Profile Document to the statistics the later stages use.

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Column name → statistics map, in column order.
pub type StatsDocument = Map<String, Value>;

/// Statistic names kept for every column.
pub const STATS_WHITELIST: [&str; 11] = [
    "n_distinct",
    "p_distinct",
    "type",
    "value_counts_without_nan",
    "n_missing",
    "n",
    "p_missing",
    "min",
    "max",
    "mean",
    "std",
];

/// Projects the `variables` section of a Profile Document onto the
/// whitelist.
///
/// Keys absent from a column's statistics stay absent. Columns whose
/// statistics are not a map are dropped. The retained keys keep their
/// source order.
#[must_use]
pub fn project(profile: &Value) -> StatsDocument {
    let Some(variables) = profile.get("variables").and_then(Value::as_object) else {
        warn!("Profile document has no 'variables' section");
        return StatsDocument::new();
    };

    let mut cleaned = StatsDocument::new();
    for (column, stats) in variables {
        let Some(stats) = stats.as_object() else {
            debug!("Dropping column '{}' without a statistics map", column);
            continue;
        };

        cleaned.insert(column.clone(), Value::Object(project_stats(stats)));
    }

    cleaned
}

/// Keeps only whitelisted entries of one statistics map.
#[must_use]
pub fn project_stats(stats: &Map<String, Value>) -> Map<String, Value> {
    stats
        .iter()
        .filter(|(key, _)| STATS_WHITELIST.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
