//! # job-profiler
//!
//! Profiles a directory of JSON job listings and turns the statistics into
//! an LLM-ready, human-described data dictionary.
//!
//! ## Features
//!
//! - Flattening of nested records into `parent > child` columns
//! - Per-column statistics with type inference
//! - Bounded value distributions with an explicit truncation marker
//! - Column descriptions from an OpenRouter-compatible API, cached on disk
//! - Atomic artifact writes with optional backups
//!
//! ## Quick Start
//!
//! ```no_run
//! use job_profiler::{Config, Pipeline, Stage};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .source_dir("./listings")
//!     .report_dir("./report")
//!     .run_name("listings")
//!     .build()?;
//!
//! Pipeline::new(config)?.run(Stage::Profile)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Every stage reads the artifact of the previous one and writes its own:
//! 1. **Profile**: records → `{name}_raw.json`
//! 2. **Clean**: whitelist projection → `{name}_cleaned.json`
//! 3. **Shrink**: bounded distributions → `{name}_shrinked.json`
//! 4. **Enrich**: generated descriptions → `{name}_enriched.json`

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod pipeline;

pub mod aggregator;
pub mod artifact;
pub mod cache;
pub mod enricher;
pub mod llm;
pub mod profiler;
pub mod projector;
pub mod prompt;
pub mod shrinker;
pub mod table;

pub use config::{Config, ConfigBuilder, LlmConfig, LlmConfigBuilder};
pub use error::{Error, Result};
pub use pipeline::{EnrichOutcome, Pipeline, PipelineStats, ProfileOutcome, Stage, StageReport};

/// Runs the selected stage with the given configuration.
///
/// `llm` is only consulted when the enrichment stage runs.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The source directory is missing (profile stage)
/// - A stage's input artifact does not exist
/// - A generation request fails
/// - File operations fail
///
/// # Examples
///
/// ```no_run
/// use job_profiler::{run, Config, LlmConfig, Stage};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder().source_dir("./listings").build()?;
/// let llm = LlmConfig::builder().api_key("sk-or-...").build();
///
/// run(config, llm, Stage::All)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config, llm: LlmConfig, stage: Stage) -> Result<PipelineStats> {
    Pipeline::new(config)?.with_llm(llm).run(stage)
}
