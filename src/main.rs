mod bulk;
mod db;
mod error;
mod extractor;
mod film;
mod runlog;
mod scraper;
mod seed;
mod settings;
mod stats;
mod status;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::bulk::BulkWriter;
use crate::extractor::ImdbExtractor;
use crate::runlog::RunLog;
use crate::scraper::{FilmScraper, ScraperOptions};
use crate::seed::SeedReader;
use crate::settings::{Settings, CONFIG_FILE};

#[derive(Parser)]
#[command(
    name = "filmdb_scraper",
    about = "Enrich IMDb seed films from their pages and build a bulk index file"
)]
struct Cli {
    /// Settings file (optional)
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// Seed dataset (.csv, .xlsx, .sqlite or .db)
    #[arg(long)]
    seed: Option<PathBuf>,
    /// First seed row of the working set (0-based)
    #[arg(long)]
    start: Option<usize>,
    /// Number of seed rows in the working set
    #[arg(short = 'n', long)]
    count: Option<usize>,
    /// Run log, appended to
    #[arg(long)]
    log: Option<PathBuf>,
    /// Bulk task file, appended to
    #[arg(long)]
    bulk: Option<PathBuf>,
    /// Films enriched at once (default: one per core)
    #[arg(short = 'j', long)]
    workers: Option<usize>,
    /// Per-fetch timeout in seconds (0 = none)
    #[arg(long)]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every film of the working set
    All,
    /// Enrich a single film
    One {
        /// IMDb id
        id: u64,
    },
    /// Enrich a set of films, e.g. `set 114709,113497` or `set "[114709, 113497]"`
    Set {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load(&self.config)
            .with_context(|| format!("loading settings from {}", self.config.display()))?;
        if let Some(seed) = &self.seed {
            settings.seed = seed.clone();
        }
        if let Some(start) = self.start {
            settings.start = start;
        }
        if let Some(count) = self.count {
            settings.count = count;
        }
        if let Some(log) = &self.log {
            settings.log = log.clone();
        }
        if let Some(bulk) = &self.bulk {
            settings.bulk = bulk.clone();
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            settings.fetch_timeout_secs = Some(timeout);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = cli.settings()?;
    info!(settings = ?settings, "settings loaded");

    let set_ids = match &cli.command {
        Commands::Set { ids } => Some(parse_ids(ids)?),
        _ => None,
    };

    // The run log exists even when the seed cannot be opened.
    let log = RunLog::open(&settings.log)
        .with_context(|| format!("opening run log {}", settings.log.display()))?;
    let reader = open_seed(&settings.seed, &log)?;
    let extractor = Arc::new(ImdbExtractor::new(&settings.user_agent)?);
    let options = ScraperOptions {
        workers: settings.workers(),
        fetch_timeout: settings.fetch_timeout(),
    };
    let mut scraper = FilmScraper::new(
        reader.as_ref(),
        settings.start,
        settings.count,
        extractor,
        log,
        options,
    )?;
    println!(
        "Enriching from {} (rows {}..{}), {} films loaded",
        settings.seed.display(),
        settings.start,
        settings.start.saturating_add(settings.count),
        scraper.films().len()
    );

    let result: anyhow::Result<()> = match (&cli.command, set_ids) {
        (Commands::Set { .. }, Some(ids)) => {
            let missing = scraper.enrich_set(&ids).await;
            if missing.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("films not in the working set: {:?}", missing))
            }
        }
        (Commands::One { id }, _) => {
            let outcome = scraper.enrich_one(*id).await;
            if let Some(film) = scraper.film(*id) {
                println!("Film {}: {}", id, film.status());
            }
            outcome.map_err(Into::into)
        }
        _ => {
            scraper.enrich_all().await;
            Ok(())
        }
    };
    if scraper.is_halted() {
        println!("Source unreachable, remaining films were skipped.");
    }
    let not_enriched = &scraper.stats().not_enriched;
    if !not_enriched.is_empty() {
        info!(?not_enriched, "films left without enrichment");
    }

    // Output and summary are produced even when the mode failed.
    let bulk = scraper.write_bulk_output(&BulkWriter::new(&settings.bulk));
    let stats = scraper.close();
    println!(
        "Done: {} enriched ({} failed, {} uncompleted, {} skipped).",
        stats.ratio(stats.successful),
        stats.failed,
        stats.uncompleted,
        stats.skipped()
    );
    if let Ok(report) = &bulk {
        println!(
            "Bulk file: {} tasks written to {}",
            report.written,
            settings.bulk.display()
        );
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result?;
    bulk?;
    Ok(())
}

/// A seed that cannot be opened is still reported in the run log.
fn open_seed(path: &Path, log: &RunLog) -> anyhow::Result<Box<dyn SeedReader>> {
    seed::open(path).or_else(|e| {
        log.write_line(&format!("Cannot open seed data: {}", e))?;
        Err(e.into())
    })
}

/// Accepts `1,2,3`, `1 2 3` and the bracketed `[1, 2, 3]` form, possibly
/// split across several shell arguments.
fn parse_ids(args: &[String]) -> anyhow::Result<Vec<u64>> {
    let joined = args.join(",");
    let ids = joined
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|part| part.trim_matches(|c| c == '[' || c == ']'))
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .with_context(|| format!("invalid film id '{}'", part))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if ids.is_empty() {
        bail!("no film ids given");
    }
    Ok(ids)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
