use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pr_harvester::config::AppConfig;
use pr_harvester::dataset::{CsvSink, DatasetSink, JsonSink};
use pr_harvester::discovery::{self, DiscoverySettings};
use pr_harvester::types::{load_repositories, save_repositories, RepositoryDescriptor};
use pr_harvester::Collector;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pr-harvester")]
#[command(about = "Collect reviewed, closed pull requests and their metrics from GitHub")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect pull requests from a repository list into CSV and JSON files
    Collect {
        /// Repository list produced by `discover`; falls back to REPOSITORIES
        #[arg(short, long)]
        repositories: Option<PathBuf>,

        /// Directory receiving pull_requests.csv and pull_requests.json
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Override MAX_PRS_PER_REPOSITORY
        #[arg(long)]
        max_prs: Option<usize>,
    },

    /// Find popular repositories with enough closed pull requests
    Discover {
        /// Number of search results to consider
        #[arg(short, long, default_value = "200")]
        limit: usize,

        /// Minimum number of closed pull requests
        #[arg(long, default_value = "100")]
        min_closed_prs: u64,

        /// Repository search query
        #[arg(short, long, default_value = "stars:>1000")]
        query: String,

        /// Where to write the repository list
        #[arg(short, long, default_value = "repositories.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pr_harvester=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Collect {
            repositories,
            output_dir,
            max_prs,
        } => collect(repositories.as_deref(), &output_dir, max_prs).await,
        Command::Discover {
            limit,
            min_closed_prs,
            query,
            output,
        } => {
            let settings = DiscoverySettings {
                query,
                limit,
                min_closed_prs,
            };
            discover(settings, &output).await
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<AppConfig> {
    AppConfig::from_env().context("failed to load configuration from the environment")
}

async fn collect(repositories: Option<&Path>, output_dir: &Path, max_prs: Option<usize>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(max_prs) = max_prs {
        config.max_prs_per_repository = max_prs;
    }

    let repositories = match repositories {
        Some(path) => load_repositories(path)?,
        None => config
            .repositories
            .iter()
            .map(RepositoryDescriptor::from)
            .collect(),
    };
    if repositories.is_empty() {
        anyhow::bail!("no repositories to collect; pass --repositories or set REPOSITORIES");
    }

    let collector = Collector::new(&config)?;
    let collection = collector.collect(&repositories).await;

    let summary = collection.dataset.summary();
    let report = &collection.report;
    tracing::info!(
        total = summary.total,
        merged = summary.merged,
        closed_without_merge = summary.closed_without_merge,
        repositories = summary.repositories,
        "Dataset summary"
    );
    tracing::info!(
        processed = report.repositories_processed,
        failed = report.repositories_failed,
        candidates = report.candidates_seen,
        no_reviews = report.rejected_no_reviews,
        too_fast = report.rejected_too_fast,
        dropped = report.dropped_unenriched,
        cooldowns = collector.fetcher().gate().cooldowns(),
        "Collection report"
    );

    if collection.dataset.is_empty() {
        anyhow::bail!("no pull requests were collected");
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let sinks: [Box<dyn DatasetSink>; 2] = [
        Box::new(CsvSink::new(output_dir.join("pull_requests.csv"))),
        Box::new(JsonSink::new(output_dir.join("pull_requests.json"))),
    ];
    for sink in &sinks {
        sink.persist(&collection.dataset)?;
    }
    Ok(())
}

async fn discover(settings: DiscoverySettings, output: &Path) -> Result<()> {
    let config = load_config()?;
    let collector = Collector::new(&config)?;

    let repositories = discovery::discover(collector.fetcher(), &settings).await;
    if repositories.is_empty() {
        anyhow::bail!("no repositories matched the discovery criteria");
    }

    save_repositories(output, &repositories)?;
    tracing::info!("Saved {} repositories to {}", repositories.len(), output.display());
    Ok(())
}
