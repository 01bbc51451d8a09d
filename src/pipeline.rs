use crate::{
    aggregator::{AggregateStats, Aggregator},
    artifact::{ArtifactPaths, ArtifactStore},
    cache::{CacheStats, CachedGenerator, ResponseCache},
    config::{Config, LlmConfig},
    enricher::Enricher,
    error::{Error, Result},
    llm::{OpenRouterClient, TextGenerator},
    profiler::{BasicProfiler, Profiler},
    projector::{self, StatsDocument},
    prompt::PromptEngine,
    shrinker::{self, ShrinkReport},
};
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

/// Pipeline stages a run can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Read records and write the Profile Document
    Profile,
    /// Project the Profile Document onto the whitelist
    Clean,
    /// Bound the value distributions
    Shrink,
    /// Generate descriptions
    Enrich,
    /// Every stage in order
    All,
}

impl Stage {
    /// Returns the name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Clean => "clean",
            Self::Shrink => "shrink",
            Self::Enrich => "enrich",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timing and output of one executed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// Stage that ran
    pub stage: Stage,
    /// Artifact written, if any
    pub output: Option<PathBuf>,
    /// Wall-clock time
    pub duration: Duration,
}

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Stages executed, in order
    pub stages: Vec<StageReport>,

    /// Records loaded by the profile stage
    pub records: usize,

    /// Record files that failed to load
    pub ingest_errors: usize,

    /// Columns in the last statistics document handled
    pub columns: usize,

    /// Columns whose distribution was truncated
    pub truncated_columns: usize,

    /// Generation requests actually sent
    pub requests_sent: usize,

    /// Generation requests answered from the cache
    pub cache_hits: usize,

    /// Total execution time
    pub duration: Duration,
}

impl PipelineStats {
    /// Returns the last artifact written, if any.
    #[must_use]
    pub fn last_output(&self) -> Option<&Path> {
        self.stages.iter().rev().find_map(|s| s.output.as_deref())
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Pipeline Execution Summary                 ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Records Loaded:       {:>8}                        ║",
            self.records
        );
        println!(
            "║   - Load errors:      {:>8}                        ║",
            self.ingest_errors
        );
        println!(
            "║ Columns:              {:>8}                        ║",
            self.columns
        );
        println!(
            "║   - Truncated:        {:>8}                        ║",
            self.truncated_columns
        );
        println!(
            "║ LLM Requests:         {:>8}                        ║",
            self.requests_sent
        );
        println!(
            "║   - Cache hits:       {:>8}                        ║",
            self.cache_hits
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        for report in &self.stages {
            println!(
                "║   - {:<17} {:>8.2}s                     ║",
                format!("{}:", report.stage),
                report.duration.as_secs_f64()
            );
        }
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        if let Some(output) = self.last_output() {
            println!("║                                                       ║");
            println!("║ Output:                                               ║");
            println!("║   {}", output.display());
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Result of the profile stage.
#[derive(Debug, Clone)]
pub struct ProfileOutcome {
    /// Ingestion counters
    pub ingest: AggregateStats,
    /// Profile Document path; `None` when no record was loaded
    pub output: Option<PathBuf>,
}

/// Result of the enrich stage.
#[derive(Debug, Clone, Copy)]
pub struct EnrichOutcome {
    /// Columns described
    pub columns: usize,
    /// Cache hit/miss counters
    pub cache: CacheStats,
}

/// Staged pipeline: profile → clean → shrink → enrich.
///
/// Every stage reads one artifact and writes the next, so each can run on
/// its own against the output of an earlier run.
pub struct Pipeline {
    config: Config,
    llm: LlmConfig,
    paths: ArtifactPaths,
    store: ArtifactStore,
    profiler: Box<dyn Profiler>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            paths: ArtifactPaths::from_config(&config),
            store: ArtifactStore::new(&config),
            llm: LlmConfig::default(),
            profiler: Box::new(BasicProfiler::default()),
            config,
        })
    }

    /// Sets the text generation settings used by the enrich stage.
    #[must_use]
    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    /// Replaces the built-in profiler.
    #[must_use]
    pub fn with_profiler(mut self, profiler: Box<dyn Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Returns the artifact paths of this run.
    #[must_use]
    pub const fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Executes the selected stage (or all of them) on the default
    /// artifact paths.
    ///
    /// # Errors
    ///
    /// Returns an error if any executed stage fails. With [`Stage::All`],
    /// an ingestion that yields no records is an error as well.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use job_profiler::{Config, Pipeline, Stage};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .source_dir("./listings")
    ///     .run_name("listings")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run(Stage::Profile)?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(run = %self.config.run_name))]
    pub fn run(&self, stage: Stage) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let mut stats = PipelineStats::default();

        info!("Starting pipeline execution");

        match stage {
            Stage::Profile => self.run_profile(&mut stats).map(|_| ())?,
            Stage::Clean => self.run_clean(&mut stats)?,
            Stage::Shrink => self.run_shrink(&mut stats)?,
            Stage::Enrich => self.run_enrich(&mut stats)?,
            Stage::All => {
                info!("Stage 1/4: Profiling records...");
                if self.run_profile(&mut stats)?.is_none() {
                    return Err(Error::no_records(&self.config.source_dir));
                }
                info!("Stage 2/4: Cleaning statistics...");
                self.run_clean(&mut stats)?;
                info!("Stage 3/4: Shrinking distributions...");
                self.run_shrink(&mut stats)?;
                info!("Stage 4/4: Enriching with descriptions...");
                self.run_enrich(&mut stats)?;
            }
        }

        stats.duration = start_time.elapsed();
        info!(
            "✓ Pipeline completed successfully in {:.2}s",
            stats.duration.as_secs_f64()
        );

        Ok(stats)
    }

    fn run_profile(&self, stats: &mut PipelineStats) -> Result<Option<PathBuf>> {
        let started = Instant::now();
        let outcome = self.profile(&self.paths.raw)?;

        stats.records = outcome.ingest.records;
        stats.ingest_errors = outcome.ingest.errors;
        stats.stages.push(StageReport {
            stage: Stage::Profile,
            output: outcome.output.clone(),
            duration: started.elapsed(),
        });

        Ok(outcome.output)
    }

    fn run_clean(&self, stats: &mut PipelineStats) -> Result<()> {
        let started = Instant::now();
        stats.columns = self.clean(&self.paths.raw, &self.paths.cleaned)?;
        stats.stages.push(StageReport {
            stage: Stage::Clean,
            output: Some(self.paths.cleaned.clone()),
            duration: started.elapsed(),
        });
        Ok(())
    }

    fn run_shrink(&self, stats: &mut PipelineStats) -> Result<()> {
        let started = Instant::now();
        let report = self.shrink(&self.paths.cleaned, &self.paths.shrunk)?;
        stats.truncated_columns = report.truncated_columns();
        stats.stages.push(StageReport {
            stage: Stage::Shrink,
            output: Some(self.paths.shrunk.clone()),
            duration: started.elapsed(),
        });
        Ok(())
    }

    fn run_enrich(&self, stats: &mut PipelineStats) -> Result<()> {
        let started = Instant::now();

        // Credentials are checked before the input is even read.
        let client = OpenRouterClient::new(&self.llm)?;
        let outcome = self.enrich(&client, &self.paths.shrunk, &self.paths.enriched)?;

        stats.columns = outcome.columns;
        stats.requests_sent = outcome.cache.misses;
        stats.cache_hits = outcome.cache.hits;
        stats.stages.push(StageReport {
            stage: Stage::Enrich,
            output: Some(self.paths.enriched.clone()),
            duration: started.elapsed(),
        });
        Ok(())
    }

    /// Reads the source directory, profiles the records and writes the
    /// Profile Document to `output`.
    ///
    /// Nothing is written when no record could be loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the source directory is invalid, profiling fails
    /// or the document cannot be written.
    #[instrument(skip(self), fields(source = %self.config.source_dir.display()))]
    pub fn profile(&self, output: &Path) -> Result<ProfileOutcome> {
        info!("Analyzing records from '{}'...", self.config.source_dir.display());
        self.config.validate_source()?;

        let aggregation = Aggregator::new(&self.config).aggregate()?;
        info!(
            "✓ Loaded {} records ({} errors)",
            aggregation.stats.records, aggregation.stats.errors
        );

        if aggregation.table.is_empty() {
            warn!(
                "No JSON files found or loaded from {}",
                self.config.source_dir.display()
            );
            return Ok(ProfileOutcome {
                ingest: aggregation.stats,
                output: None,
            });
        }

        let document = self.profiler.profile(&aggregation.table)?;
        self.store.write(output, &document)?;

        info!("✓ Profile saved to '{}'", output.display());
        Ok(ProfileOutcome {
            ingest: aggregation.stats,
            output: Some(output.to_path_buf()),
        })
    }

    /// Projects the Profile Document at `input` onto the statistics
    /// whitelist and writes the result to `output`.
    ///
    /// Returns the number of columns written.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is missing or invalid, or `output`
    /// cannot be written.
    #[instrument(skip(self))]
    pub fn clean(&self, input: &Path, output: &Path) -> Result<usize> {
        info!("Cleaning variable stats from '{}'...", input.display());

        let profile = serde_json::Value::Object(self.read_object(Stage::Clean, input)?);
        let cleaned = projector::project(&profile);
        self.store.write(output, &cleaned)?;

        info!("✓ Cleaned {} columns, saved to '{}'", cleaned.len(), output.display());
        Ok(cleaned.len())
    }

    /// Shrinks the distributions of the cleaned document at `input` and
    /// writes the result to `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is missing, is not a JSON object, or
    /// `output` cannot be written.
    #[instrument(skip(self))]
    pub fn shrink(&self, input: &Path, output: &Path) -> Result<ShrinkReport> {
        info!("Shrinking data from '{}'...", input.display());

        let mut document = self.read_stats(Stage::Shrink, input)?;
        let report = shrinker::shrink_document(&mut document, &self.config.shrink_config());
        self.store.write(output, &document)?;

        info!(
            "✓ Shrunk {} of {} distributions, saved to '{}'",
            report.truncated_columns(),
            report.columns.len(),
            output.display()
        );
        Ok(report)
    }

    /// Describes the shrunk document at `input` with `generator` and writes
    /// the Enriched Document to `output`.
    ///
    /// Answers go through the response cache at `Config::cache_path`; a
    /// rerun over unchanged input sends no request. On failure nothing is
    /// written, but answers received so far stay cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or `input` cannot be loaded, a request
    /// fails, or `output` cannot be written.
    #[instrument(skip(self, generator), fields(model = generator.model_name()))]
    pub fn enrich(
        &self,
        generator: &dyn TextGenerator,
        input: &Path,
        output: &Path,
    ) -> Result<EnrichOutcome> {
        info!("Enriching metadata from '{}'...", input.display());

        let document = self.read_stats(Stage::Enrich, input)?;
        let cache = ResponseCache::open(&self.config.cache_path)?;
        info!(
            "Using response cache {} ({} entries)",
            cache.path().display(),
            cache.len()
        );

        let cached = CachedGenerator::new(generator, cache);
        let prompts = PromptEngine::new()?;
        let enriched = Enricher::new(&cached, &prompts).enrich(&document)?;

        self.store.write(output, &enriched)?;

        let cache_stats = cached.stats();
        info!(
            "✓ Enriched {} columns ({} requests, {} cache hits), saved to '{}'",
            enriched.columns.len(),
            cache_stats.misses,
            cache_stats.hits,
            output.display()
        );

        Ok(EnrichOutcome {
            columns: enriched.columns.len(),
            cache: cache_stats,
        })
    }

    fn read_object(&self, stage: Stage, input: &Path) -> Result<StatsDocument> {
        match self.store.read(stage.name(), input)? {
            serde_json::Value::Object(document) => Ok(document),
            _ => Err(Error::Json {
                path: input.to_path_buf(),
                message: "expected a JSON object at the top level".to_string(),
            }),
        }
    }

    /// Reads a statistics document: an object mapping every column to an
    /// object of statistics.
    fn read_stats(&self, stage: Stage, input: &Path) -> Result<StatsDocument> {
        let document = self.read_object(stage, input)?;

        if let Some((column, _)) = document.iter().find(|(_, stats)| !stats.is_object()) {
            return Err(Error::Json {
                path: input.to_path_buf(),
                message: format!("statistics for column '{column}' are not an object"),
            });
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;
    use assert_fs::prelude::*;
    use std::fs;

    fn create_test_config(temp: &assert_fs::TempDir) -> Config {
        Config::builder()
            .source_dir(temp.child("listings").path())
            .report_dir(temp.child("report").path())
            .cache_path(temp.child("cache.json").path())
            .run_name("jobs")
            .max_keys(2)
            .build()
            .unwrap()
    }

    fn write_listings(temp: &assert_fs::TempDir) {
        let listings = temp.child("listings");
        listings
            .child("1.json")
            .write_str(r#"{"title": "Rust Dev", "salary": 100, "company": {"city": "Berlin"}}"#)
            .unwrap();
        listings
            .child("2.json")
            .write_str(r#"{"title": "Go Dev", "salary": 90, "company": {"city": "Berlin"}}"#)
            .unwrap();
        listings
            .child("3.json")
            .write_str(r#"{"title": "SRE", "salary": 80, "company": {"city": "Paris"}}"#)
            .unwrap();
        listings
            .child("4.json")
            .write_str(r#"{"title": "QA", "salary": 70, "company": {"city": "Berlin"}}"#)
            .unwrap();
        listings.child("broken.json").write_str("{").unwrap();
    }

    #[test]
    fn test_profile_writes_raw_document() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_listings(&temp);
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();

        let stats = pipeline.run(Stage::Profile).unwrap();

        assert_eq!(stats.records, 4);
        assert_eq!(stats.ingest_errors, 1);
        assert!(pipeline.paths().raw.exists());
        assert!(!pipeline.paths().cleaned.exists());
    }

    #[test]
    fn test_profile_with_no_records_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("listings").create_dir_all().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();

        let stats = pipeline.run(Stage::Profile).unwrap();

        assert_eq!(stats.records, 0);
        assert!(stats.last_output().is_none());
        assert!(!pipeline.paths().raw.exists());

        let err = pipeline.run(Stage::All).unwrap_err();
        assert!(matches!(err, Error::NoRecords { .. }));
    }

    #[test]
    fn test_stages_chain_through_artifacts() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_listings(&temp);
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();

        pipeline.run(Stage::Profile).unwrap();
        let stats = pipeline.run(Stage::Clean).unwrap();
        assert_eq!(stats.columns, 3);

        let cleaned: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.cleaned).unwrap()).unwrap();
        assert!(cleaned["salary"].get("sum").is_none());
        assert!(cleaned["salary"].get("mean").is_some());
        assert!(cleaned.get("company > city").is_some());

        let stats = pipeline.run(Stage::Shrink).unwrap();
        assert!(stats.truncated_columns >= 1);

        let shrunk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.shrunk).unwrap()).unwrap();
        assert_eq!(shrunk["salary"]["value_counts_without_nan"]["more ..."], -1);
    }

    #[test]
    fn test_single_stage_requires_upstream_artifact() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();

        let err = pipeline.run(Stage::Shrink).unwrap_err();
        assert!(err.is_missing_artifact());
        assert!(!pipeline.paths().shrunk.exists());
    }

    #[test]
    fn test_clean_rejects_non_object_profile() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();
        temp.child("report/jobs_raw.json").write_str("[1, 2, 3]").unwrap();

        let err = pipeline.run(Stage::Clean).unwrap_err();

        assert!(matches!(err, Error::Json { ref path, .. } if *path == paths.raw));
        assert!(!paths.cleaned.exists());
    }

    #[test]
    fn test_enrich_missing_input_sends_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();
        let mock = MockGenerator::new();

        let err = pipeline
            .enrich(&mock, &paths.shrunk, &paths.enriched)
            .unwrap_err();

        assert!(err.is_missing_artifact());
        assert!(err.to_string().contains("jobs_shrinked.json"));
        assert_eq!(mock.calls(), 0);
        assert!(!paths.enriched.exists());
    }

    #[test]
    fn test_enrich_unparsable_input_sends_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();
        temp.child("report/jobs_shrinked.json").write_str("{not json").unwrap();
        let mock = MockGenerator::new();

        let err = pipeline
            .enrich(&mock, &paths.shrunk, &paths.enriched)
            .unwrap_err();

        assert!(matches!(err, Error::Json { ref path, .. } if *path == paths.shrunk));
        assert_eq!(mock.calls(), 0);
        assert!(!paths.enriched.exists());
    }

    #[test]
    fn test_enrich_rejects_column_without_statistics_map() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();
        temp.child("report/jobs_shrinked.json")
            .write_str(r#"{"title": {"type": "Text"}, "salary": 5}"#)
            .unwrap();
        let mock = MockGenerator::new();

        let err = pipeline
            .enrich(&mock, &paths.shrunk, &paths.enriched)
            .unwrap_err();

        assert!(matches!(err, Error::Json { ref path, .. } if *path == paths.shrunk));
        assert!(err.to_string().contains("salary"));
        assert_eq!(mock.calls(), 0);
        assert!(!paths.enriched.exists());
    }

    #[test]
    fn test_enrich_without_api_key_fails_fast() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();

        // The shrunk artifact is missing too; the configuration error wins.
        let err = pipeline.run(Stage::Enrich).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_enrich_rerun_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_listings(&temp);
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();

        pipeline.run(Stage::Profile).unwrap();
        pipeline.run(Stage::Clean).unwrap();
        pipeline.run(Stage::Shrink).unwrap();

        let first_mock = MockGenerator::new();
        let first = pipeline
            .enrich(&first_mock, &paths.shrunk, &paths.enriched)
            .unwrap();
        let first_bytes = fs::read(&paths.enriched).unwrap();

        assert_eq!(first.columns, 3);
        assert_eq!(first_mock.calls(), 4);
        assert_eq!(first.cache.misses, 4);

        let second_mock = MockGenerator::new();
        let second = pipeline
            .enrich(&second_mock, &paths.shrunk, &paths.enriched)
            .unwrap();

        assert_eq!(second_mock.calls(), 0);
        assert_eq!(second.cache.hits, 4);
        assert_eq!(fs::read(&paths.enriched).unwrap(), first_bytes);
    }

    #[test]
    fn test_enrich_failure_writes_nothing_and_resumes() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_listings(&temp);
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();

        pipeline.run(Stage::Profile).unwrap();
        pipeline.run(Stage::Clean).unwrap();
        pipeline.run(Stage::Shrink).unwrap();

        let failing = MockGenerator::failing_on(2);
        assert!(pipeline.enrich(&failing, &paths.shrunk, &paths.enriched).is_err());
        assert!(!paths.enriched.exists());

        // The two answers received before the failure are reused.
        let retry = MockGenerator::new();
        let outcome = pipeline.enrich(&retry, &paths.shrunk, &paths.enriched).unwrap();
        assert_eq!(outcome.cache.hits, 2);
        assert_eq!(retry.calls(), 2);
        assert!(paths.enriched.exists());
    }

    #[test]
    fn test_enriched_document_shape() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_listings(&temp);
        let pipeline = Pipeline::new(create_test_config(&temp)).unwrap();
        let paths = pipeline.paths().clone();

        pipeline.run(Stage::Profile).unwrap();
        pipeline.run(Stage::Clean).unwrap();
        pipeline.run(Stage::Shrink).unwrap();
        pipeline
            .enrich(&MockGenerator::new(), &paths.shrunk, &paths.enriched)
            .unwrap();

        let enriched: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.enriched).unwrap()).unwrap();
        assert_eq!(enriched["description"], "description #0");
        let columns = enriched["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 3);
        assert!(columns.iter().all(|c| c.get("column_name").is_some()));
        assert!(columns.iter().all(|c| c.get("description").is_some()));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Shrink.to_string(), "shrink");
        assert_eq!(Stage::All.name(), "all");
    }
}
