use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the job-profiler library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Malformed JSON in a record or artifact file.
    #[error("Invalid JSON in '{path}': {message}")]
    Json {
        /// Path to the offending file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A stage was started without the artifact it consumes.
    #[error("Stage '{stage}' requires '{path}', which does not exist. Run the previous stage first.")]
    MissingArtifact {
        /// Stage that needed the artifact
        stage: String,
        /// Expected artifact path
        path: PathBuf,
    },

    /// Ingestion produced no records.
    #[error("No JSON records could be loaded from '{path}'")]
    NoRecords {
        /// Directory that was read
        path: PathBuf,
    },

    /// Template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Text generation request failed.
    #[error("Text generation failed: {message}")]
    Generation {
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a JSON parse error with path context.
    #[must_use]
    pub fn json(path: impl Into<PathBuf>, source: &serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        // Tera hides the useful part of the message in the source chain.
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(&source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }

        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Creates a text generation error.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Creates a missing artifact error.
    #[must_use]
    pub fn missing_artifact(stage: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            stage: stage.into(),
            path: path.into(),
        }
    }

    /// Creates a no records error.
    #[must_use]
    pub fn no_records(path: impl Into<PathBuf>) -> Self {
        Self::NoRecords { path: path.into() }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if a stage input was missing.
    #[must_use]
    pub const fn is_missing_artifact(&self) -> bool {
        matches!(self, Self::MissingArtifact { .. })
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Generation {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config());
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/test.json", io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("/tmp/test.json"));
    }

    #[test]
    fn test_missing_artifact_names_stage_and_path() {
        let err = Error::missing_artifact("shrink", "report/run_cleaned.json");
        assert!(err.is_missing_artifact());
        let message = err.to_string();
        assert!(message.contains("shrink"));
        assert!(message.contains("report/run_cleaned.json"));
    }

    #[test]
    fn test_json_error_keeps_path() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = Error::json("listing_7.json", &json_err);
        assert!(err.to_string().contains("listing_7.json"));
    }

    #[test]
    fn test_error_clone() {
        let err = Error::generation("boom");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
