use crate::{
    error::{Error, Result},
    projector::StatsDocument,
};
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

const OVERALL_TEMPLATE: &str = "overall";
const COLUMN_TEMPLATE: &str = "column";

#[derive(Serialize)]
struct OverallContext<'a> {
    data_profile: &'a str,
}

#[derive(Serialize)]
struct ColumnContext<'a> {
    all_column_names: &'a [String],
    column_name: &'a str,
    column_data: &'a str,
}

/// Renders the instruction templates sent to the text generator.
pub struct PromptEngine {
    tera: Tera,
}

impl PromptEngine {
    /// Creates an engine with the built-in templates registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());

        tera.add_raw_template(OVERALL_TEMPLATE, include_str!("../templates/overall.tera"))
            .map_err(|e| Error::template(OVERALL_TEMPLATE, e))?;

        tera.add_raw_template(COLUMN_TEMPLATE, include_str!("../templates/column.tera"))
            .map_err(|e| Error::template(COLUMN_TEMPLATE, e))?;

        Ok(Self { tera })
    }

    /// Renders the dataset-level prompt for `document`.
    ///
    /// The document is embedded in compact form, keys in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or rendering fails.
    pub fn overall(&self, document: &StatsDocument) -> Result<String> {
        let data_profile = serde_json::to_string(document)?;
        self.render(
            OVERALL_TEMPLATE,
            &OverallContext {
                data_profile: &data_profile,
            },
        )
    }

    /// Renders the prompt describing one column.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or rendering fails.
    pub fn column(&self, all_columns: &[String], column: &str, stats: &Value) -> Result<String> {
        let column_data = serde_json::to_string(stats)?;
        self.render(
            COLUMN_TEMPLATE,
            &ColumnContext {
                all_column_names: all_columns,
                column_name: column,
                column_data: &column_data,
            },
        )
    }

    fn render<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        let context = Context::from_serialize(context).map_err(|e| Error::template(template, e))?;

        self.tera
            .render(template, &context)
            .map_err(|e| Error::template(template, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> StatsDocument {
        json!({
            "title": {"type": "Text", "n": 3},
            "salary": {"type": "Numeric", "mean": 1.5}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_engine_creation() {
        assert!(PromptEngine::new().is_ok());
    }

    #[test]
    fn test_overall_embeds_compact_document() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine.overall(&document()).unwrap();

        assert!(prompt.contains("about 200 words"));
        assert!(prompt.contains(
            r#"{"title":{"type":"Text","n":3},"salary":{"type":"Numeric","mean":1.5}}"#
        ));
    }

    #[test]
    fn test_column_prompt_lists_columns_and_stats() {
        let engine = PromptEngine::new().unwrap();
        let columns = vec!["title".to_string(), "company > name".to_string()];
        let prompt = engine
            .column(&columns, "company > name", &json!({"type": "Categorical"}))
            .unwrap();

        assert!(prompt.contains(r#"["title","company > name"]"#));
        assert!(prompt.contains("column named 'company > name'"));
        assert!(prompt.contains(r#"{"type":"Categorical"}"#));
    }

    #[test]
    fn test_rendering_is_stable() {
        let engine = PromptEngine::new().unwrap();
        assert_eq!(
            engine.overall(&document()).unwrap(),
            engine.overall(&document()).unwrap()
        );
    }

    #[test]
    fn test_markup_is_not_escaped() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine
            .column(&["<b>".to_string()], "<b>", &json!({"v": "&"}))
            .unwrap();

        assert!(prompt.contains("'<b>'"));
        assert!(!prompt.contains("&lt;"));
    }
}
