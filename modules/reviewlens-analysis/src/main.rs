use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::{Claude, OpenAi, OpenRouter};
use reviewlens_analysis::notify::{AlertSink, NoopSink, WebhookSink};
use reviewlens_analysis::store::{MemoryProductStore, PgProductStore, ProductStore};
use reviewlens_analysis::{
    AnalysisOrchestrator, AnalysisQueue, AnalysisRequest, LlmAnalyzer, ProviderHealthTracker,
    ProviderRouter, ReviewAnalyzer,
};
use reviewlens_common::{AnalysisConfig, ProviderKeys, RawReview};

#[derive(Parser)]
#[command(name = "reviewlens", about = "Fake-review analysis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Health and metrics snapshot of every configured provider
    Status,
    /// Force selection of one provider
    Switch { provider: String },
    /// Estimated cost of analyzing N reviews with each provider
    CostCompare { review_count: usize },
    /// Run the full pipeline on a JSON file of scraped reviews
    Analyze {
        /// JSON array of reviews, or an object with a `reviews` array
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        asin: String,
        #[arg(long, default_value = "us")]
        country: String,
        #[arg(long, default_value_t = 0)]
        reported_total: u32,
        #[arg(long)]
        amazon_rating: Option<f64>,
        /// Prefer this provider over the health-based pick
        #[arg(long)]
        provider: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReviewFile {
    List(Vec<RawReview>),
    Wrapped { reviews: Vec<RawReview> },
}

fn build_providers(keys: &ProviderKeys, config: &AnalysisConfig) -> Vec<Arc<dyn ReviewAnalyzer>> {
    let timeout = config.provider_timeout;
    vec![
        Arc::new(LlmAnalyzer::anthropic(
            Claude::new(&keys.anthropic_api_key, &keys.anthropic_model).with_timeout(timeout),
        )) as Arc<dyn ReviewAnalyzer>,
        Arc::new(LlmAnalyzer::openai(
            OpenAi::new(&keys.openai_api_key, &keys.openai_model).with_timeout(timeout),
        )) as Arc<dyn ReviewAnalyzer>,
        Arc::new(LlmAnalyzer::openrouter(
            OpenRouter::new(&keys.openrouter_api_key, &keys.openrouter_model)
                .with_app_name("reviewlens")
                .with_timeout(timeout),
        )) as Arc<dyn ReviewAnalyzer>,
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reviewlens=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AnalysisConfig::from_env()?;
    let keys = ProviderKeys::from_env();
    keys.log_redacted();

    let providers = build_providers(&keys, &config);
    let tracker = Arc::new(ProviderHealthTracker::with_providers(
        providers.iter().map(|p| p.name().to_string()),
    ));
    let router = Arc::new(ProviderRouter::new(providers, tracker));

    match cli.command {
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&router.status())?);
        }
        Command::Switch { provider } => {
            if router.force_select(&provider) {
                println!("Switched to {provider}");
            } else {
                anyhow::bail!("Provider {provider} is unknown or unavailable");
            }
        }
        Command::CostCompare { review_count } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&router.cost_comparison(review_count))?
            );
        }
        Command::Analyze {
            input,
            asin,
            country,
            reported_total,
            amazon_rating,
            provider,
        } => {
            let raw = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let reviews = match serde_json::from_slice::<ReviewFile>(&raw)
                .with_context(|| format!("{} is not a review list", input.display()))?
            {
                ReviewFile::List(reviews) | ReviewFile::Wrapped { reviews } => reviews,
            };

            if let Some(name) = provider.as_deref() {
                if !router.force_select(name) {
                    anyhow::bail!("Provider {name} is unknown or unavailable");
                }
            }

            let store: Arc<dyn ProductStore> = match std::env::var("DATABASE_URL") {
                Ok(url) if !url.trim().is_empty() => {
                    let store = PgProductStore::connect(&url).await?;
                    store.migrate().await?;
                    Arc::new(store)
                }
                _ => {
                    info!("No DATABASE_URL set, results kept in memory");
                    Arc::new(MemoryProductStore::new())
                }
            };

            let alerts: Arc<dyn AlertSink> = match WebhookSink::from_env() {
                Some(sink) => {
                    info!("Alert webhook enabled");
                    Arc::new(sink)
                }
                None => Arc::new(NoopSink),
            };

            let workers = std::env::var("REVIEWLENS_WORKERS")
                .ok()
                .map(|w| w.parse::<usize>())
                .transpose()
                .context("REVIEWLENS_WORKERS must be a number")?
                .unwrap_or(4);

            let orchestrator = Arc::new(AnalysisOrchestrator::new(config, router, store, alerts));
            let queue = AnalysisQueue::start(orchestrator, workers);

            let mut request = AnalysisRequest::builder()
                .asin(asin)
                .country(country)
                .reviews(reviews)
                .reported_total(reported_total)
                .build();
            request.amazon_rating = amazon_rating;

            let result = queue.run(request).await;
            queue.shutdown().await;

            let report = result??;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
