use anyhow::Context;
use clap::{ArgGroup, Parser};
use job_profiler::{Config, LlmConfig, Pipeline, Stage};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "job-profiler",
    version,
    author,
    about = "Profile a directory of JSON job listings and describe it with an LLM",
    long_about = "Profile a directory of JSON job listings and turn the statistics into \
    a described data dictionary.\n\n\
    The pipeline runs in four stages, each reading the artifact of the previous one:\n  \
      profile  →  {name}_raw.json\n  \
      clean    →  {name}_cleaned.json\n  \
      shrink   →  {name}_shrinked.json\n  \
      enrich   →  {name}_enriched.json\n\n\
    USAGE EXAMPLES:\n  \
      # Profile only\n  \
      job-profiler ./listings --name jobs\n\n  \
      # Run every stage\n  \
      OPENROUTER_API_KEY=sk-or-... job-profiler ./listings --name jobs --all\n\n  \
      # Re-run shrinking with a tighter limit\n  \
      job-profiler ./listings --name jobs --shrink --max-keys 5"
)]
#[command(group(
    ArgGroup::new("stage")
        .args(["all", "clean", "shrink", "enrich"])
        .multiple(false)
))]
struct Cli {
    /// Directory containing the JSON job listings
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Run every stage: profile, clean, shrink and enrich
    #[arg(short, long)]
    all: bool,

    /// Clean the raw profile of an earlier run
    #[arg(short, long)]
    clean: bool,

    /// Shrink the cleaned statistics of an earlier run
    #[arg(short, long)]
    shrink: bool,

    /// Enrich the shrunk statistics of an earlier run
    #[arg(short, long)]
    enrich: bool,

    /// Run name used for every artifact filename
    #[arg(short, long, default_value = "report")]
    name: String,

    /// Maximum number of JSON files to read
    #[arg(short, long, default_value_t = 1_000)]
    limit: usize,

    /// Directory receiving the artifacts
    #[arg(short = 'o', long, default_value = "report", value_name = "PATH")]
    report_dir: PathBuf,

    /// Distribution entries kept for non-categorical columns
    #[arg(long, default_value_t = 10)]
    max_keys: usize,

    /// Character budget over distribution keys of text columns
    #[arg(long = "max-chars", default_value_t = 1_000)]
    max_chars: usize,

    /// Response cache file
    #[arg(long, default_value = ".llm_cache.json", value_name = "FILE")]
    cache: PathBuf,

    /// API key for the chat-completions service
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the chat-completions API
    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    base_url: String,

    /// Model used for descriptions
    #[arg(long, env = "OPENROUTER_MODEL", default_value = "anthropic/claude-3.5-sonnet")]
    model: String,

    /// Value sent as the HTTP-Referer header
    #[arg(long, env = "YOUR_SITE_URL", default_value = "https://github.com/data-describer")]
    site_url: String,

    /// Value sent as the X-Title header
    #[arg(long, env = "YOUR_SITE_NAME", default_value = "Data Describer")]
    site_name: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 120, value_name = "SECS")]
    timeout: u64,

    /// Keep a timestamped copy of an artifact before replacing it
    #[arg(long)]
    backup: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    const fn stage(&self) -> Stage {
        if self.all {
            Stage::All
        } else if self.clean {
            Stage::Clean
        } else if self.shrink {
            Stage::Shrink
        } else if self.enrich {
            Stage::Enrich
        } else {
            Stage::Profile
        }
    }

    fn llm_config(&self) -> LlmConfig {
        let mut builder = LlmConfig::builder()
            .base_url(&self.base_url)
            .model(&self.model)
            .site_url(&self.site_url)
            .site_name(&self.site_name)
            .timeout_secs(self.timeout);

        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }

        builder.build()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let stage = cli.stage();
    let llm = cli.llm_config();

    let config = Config::builder()
        .source_dir(cli.directory)
        .report_dir(cli.report_dir)
        .run_name(cli.name)
        .file_limit(cli.limit)
        .max_keys(cli.max_keys)
        .max_chars_for_text(cli.max_chars)
        .cache_path(cli.cache)
        .backup_existing(cli.backup)
        .build()
        .context("Failed to build configuration")?;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .with_llm(llm)
        .run(stage)
        .with_context(|| format!("Stage '{stage}' failed"))?;

    if stage == Stage::All {
        stats.print_summary();
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("job_profiler=info"),
        1 => EnvFilter::new("job_profiler=debug"),
        _ => EnvFilter::new("job_profiler=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
