use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use metric_scraper::batch::{NoProgress, ProgressSink};
use metric_scraper::config::{ConfigLoader, JobConfig};
use metric_scraper::extractor::MetricExtractor;
use metric_scraper::metrics::collector::MetricsCollector;
use metric_scraper::metrics::snapshot::MetricsSnapshot;
use metric_scraper::model::{MetricKind, MetricRequest};
use metric_scraper::output::export_session;
use metric_scraper::progress::BarProgress;
use metric_scraper::retry::{RateLimiter, with_retry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;

#[derive(Parser)]
#[command(name = "metric-scraper")]
#[command(version = "0.1.0")]
#[command(about = "Enrich spreadsheets of track and video links with play and view counts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every dataset in a job file and export the results
    Run {
        /// Path to the job file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Plain log output instead of progress bars
        #[arg(long)]
        no_progress: bool,
    },
    /// Validate a job file
    Check {
        /// Path to the job file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Extract one metric from one URL, with retries
    Probe {
        #[arg(short, long)]
        url: String,

        /// play-count or view-count
        #[arg(short, long)]
        kind: MetricKind,

        /// Job file to take browser, locator and retry settings from
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = Arc::new(MultiProgress::new());

    match cli.command {
        Commands::Run { config, no_progress } => {
            let progress = !no_progress;
            if progress {
                indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger).try_init()?;
            } else {
                log::set_boxed_logger(Box::new(logger))?;
                log::set_max_level(log::LevelFilter::Info);
            }

            log::info!("Loading config from {:?}", config);
            let job = ConfigLoader::load(&config)?;
            log::info!("Loaded job: {}", job.name);

            let metrics = Arc::new(MetricsCollector::new());
            let processor = ConfigLoader::create_processor(&job, Some(metrics.clone()))?;
            let mut session = ConfigLoader::load_session(&job)?;

            let mut stats_task = None;
            if progress {
                let stats = multi.add(ProgressBar::new_spinner());
                stats.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
                stats_task = Some(tokio::spawn(
                    WatchStream::new(processor.watch_metrics()).for_each(move |snapshot: MetricsSnapshot| {
                        stats.set_message(format!(
                            "Rows: {}/{} | Success: {:.1}% | Retries: {}",
                            snapshot.rows_processed,
                            snapshot.rows_queued,
                            snapshot.success_rate,
                            snapshot.retries
                        ));
                        stats.tick();
                        futures::future::ready(())
                    }),
                ));
            }

            for dataset in &job.datasets {
                let bar = progress.then(|| BarProgress::new(multi.add(ProgressBar::new(0))));
                let sink: &dyn ProgressSink = match &bar {
                    Some(bar) => bar,
                    None => &NoProgress,
                };

                let dataset_processor =
                    ConfigLoader::create_dataset_processor(&job, dataset, Some(metrics.clone()))?;
                let summary = dataset_processor
                    .run(&mut session, &dataset.name, &dataset.url_column, dataset.kind, sink)
                    .await?;

                if let Some(bar) = bar {
                    bar.finish(format!("✅ {} -> '{}'", dataset.name, summary.column));
                }
            }

            if let Some(task) = stats_task {
                task.abort();
            }

            let mut output = ConfigLoader::create_output(&job, Some(multi.clone())).await?;
            export_session(&session, output.as_mut()).await?;

            let final_metrics = processor.get_metrics();
            println!("\n✅ Run Completed:");
            for run in session.history() {
                println!(
                    "   {} / {}: {} ok, {} not found, {} failed, {} skipped",
                    run.dataset, run.column, run.success, run.not_found, run.failed, run.skipped
                );
            }
            println!("   Rows Processed: {}", final_metrics.rows_processed);
            println!("   Success Rate: {:.1}%", final_metrics.success_rate);
            println!("   Retries: {}", final_metrics.retries);
            println!("   Average Row Time: {}ms", final_metrics.avg_row_time_ms);
            println!("   Total Time: {:.1}s", final_metrics.elapsed_seconds);
        }
        Commands::Check { config } => {
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(log::LevelFilter::Info);
            match ConfigLoader::load(&config) {
                Ok(cfg) => {
                    println!("✅ Config is valid:");
                    println!("   Name: {}", cfg.name);
                    for dataset in &cfg.datasets {
                        println!(
                            "   Dataset: {} ({} from '{}' in {})",
                            dataset.name, dataset.kind, dataset.url_column, dataset.input
                        );
                    }
                    println!("   Locators: {}", cfg.locators.len());
                    println!("   Max attempts: {}", cfg.retry.max_attempts);
                }
                Err(e) => {
                    eprintln!("❌ Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Probe { url, kind, config } => {
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(log::LevelFilter::Debug);

            let job = match config {
                Some(path) => ConfigLoader::load(path)?,
                None => JobConfig::default(),
            };
            let extractor = ConfigLoader::create_extractor(&job)?;
            let request = MetricRequest::new(url, kind);
            let mut limiter = RateLimiter::new(job.retry.rate_limit());

            let result = with_retry(&job.retry, &mut limiter, request.url(), || {
                extractor.extract(&request)
            })
            .await;

            let normalized = job.normalize.normalize(result.value, kind);
            println!("{}: {:?} after {} attempt(s)", kind, result.status, result.attempts);
            println!("   Raw: {}", result.value.map(|v| v.to_string()).unwrap_or_else(|| "-".into()));
            println!("   Normalized: {}", normalized.map(|v| v.to_string()).unwrap_or_else(|| "-".into()));
        }
    }

    Ok(())
}
