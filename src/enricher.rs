//! Attaches generated descriptions to a shrunk statistics document.

use crate::{
    error::{Error, Result},
    llm::TextGenerator,
    projector::StatsDocument,
    prompt::PromptEngine,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Final output: a dataset description plus one annotated entry per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDocument {
    /// Description of the whole dataset
    pub description: String,

    /// `{column_name, ...stats, description}` per column, in input order
    pub columns: Vec<Map<String, Value>>,
}

/// Issues the generation requests and assembles the [`EnrichedDocument`].
///
/// Requests are sent one at a time; the first failure aborts the run.
pub struct Enricher<'a> {
    generator: &'a dyn TextGenerator,
    prompts: &'a PromptEngine,
}

impl<'a> Enricher<'a> {
    /// Creates an enricher sending prompts rendered by `prompts` to
    /// `generator`.
    #[must_use]
    pub fn new(generator: &'a dyn TextGenerator, prompts: &'a PromptEngine) -> Self {
        Self { generator, prompts }
    }

    /// Describes the dataset, then every column in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if a column's statistics are not a map, a prompt
    /// cannot be rendered, or any generation request fails.
    pub fn enrich(&self, document: &StatsDocument) -> Result<EnrichedDocument> {
        let column_names: Vec<String> = document.keys().cloned().collect();
        info!(
            "Found {} columns: {}",
            column_names.len(),
            column_names.join(", ")
        );

        info!("Generating overall dataset description...");
        let prompt = self.prompts.overall(document)?;
        let description = self.generator.generate(&prompt)?.trim().to_string();
        debug!("Overall description: {}", description);

        info!("Generating descriptions for each column...");
        let total = column_names.len();
        let mut columns = Vec::with_capacity(total);

        for (i, (name, stats)) in document.iter().enumerate() {
            info!("  ({}/{}) Processing column: '{}'", i + 1, total, name);

            let Some(stats_map) = stats.as_object() else {
                return Err(Error::Serialization {
                    message: format!("statistics for column '{name}' are not a map"),
                });
            };

            let prompt = self.prompts.column(&column_names, name, stats)?;
            let column_description = self.generator.generate(&prompt)?.trim().to_string();
            debug!("Description for '{}': {}", name, column_description);

            columns.push(annotate(name, stats_map, column_description));
        }

        info!("All column descriptions generated");
        Ok(EnrichedDocument {
            description,
            columns,
        })
    }
}

/// Builds `{column_name, ...stats, description}`.
fn annotate(name: &str, stats: &Map<String, Value>, description: String) -> Map<String, Value> {
    let mut entry = Map::with_capacity(stats.len() + 2);
    entry.insert("column_name".to_string(), Value::from(name));
    for (key, value) in stats {
        entry.insert(key.clone(), value.clone());
    }
    entry.insert("description".to_string(), Value::String(description));
    entry
}
