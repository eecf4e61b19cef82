use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::bulk::{BulkReport, BulkWriter};
use crate::error::ScraperError;
use crate::extractor::PageExtractor;
use crate::film::Film;
use crate::runlog::{self, RunLog};
use crate::seed::{SeedBatch, SeedReader};
use crate::stats::{Outcome, ProgressTracker, RunStats};

const HALT_LINE: &str = "ACCESS DENIED OR SERVER DOWN";

#[derive(Debug, Clone)]
pub struct ScraperOptions {
    /// Films enriched at once.
    pub workers: usize,
    pub fetch_timeout: Option<Duration>,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            fetch_timeout: None,
        }
    }
}

/// What a worker sends back for the film at `pos`.
enum Report {
    Done { pos: usize, film: Film, elapsed: Duration },
    Panicked { pos: usize, elapsed: Duration, reason: String },
    Skipped { pos: usize },
}

/// Owns the working set and drives its enrichment.
///
/// Workers enrich clones of the films and send them back over a channel;
/// the aggregator loop in [`FilmScraper::dispatch`] is the only place that
/// writes films, counters and run-log record lines.
pub struct FilmScraper<E> {
    films: Vec<Film>,
    index: HashMap<u64, usize>,
    extractor: Arc<E>,
    log: RunLog,
    stats: RunStats,
    options: ScraperOptions,
    halt: Arc<AtomicBool>,
    halt_reported: bool,
    started: Instant,
}

impl<E> FilmScraper<E>
where
    E: PageExtractor + 'static,
{
    /// Loads rows `[start, start + count)` from `reader`. Fails when no film
    /// in the window survives validation.
    pub fn new<R>(
        reader: &R,
        start: usize,
        count: usize,
        extractor: Arc<E>,
        log: RunLog,
        options: ScraperOptions,
    ) -> Result<Self, ScraperError>
    where
        R: SeedReader + ?Sized,
    {
        let started = Instant::now();
        let source = reader.source();
        append(
            &log,
            &[
                String::new(),
                runlog::banner("NEW SCRAPPING APP"),
                format!("Started at: {}", runlog::timestamp()),
                format!("Initial data load file: {}", source),
                runlog::rule(),
            ],
        );

        let batch = reader.read(start, count)?;
        append(&log, &seed_stats(&batch));

        if batch.films.is_empty() {
            return Err(ScraperError::EmptyWorkingSet {
                source_id: source,
                start,
                end: batch.end(),
            });
        }

        let films = batch.films;
        let mut index = HashMap::with_capacity(films.len());
        for (pos, film) in films.iter().enumerate() {
            index.entry(film.id()).or_insert(pos);
        }
        info!(source = %source, films = films.len(), workers = options.workers, "working set loaded");

        Ok(Self {
            stats: RunStats::new(films.len()),
            films,
            index,
            extractor,
            log,
            options,
            halt: Arc::new(AtomicBool::new(false)),
            halt_reported: false,
            started,
        })
    }

    pub fn films(&self) -> &[Film] {
        &self.films
    }

    pub fn film(&self, id: u64) -> Option<&Film> {
        self.index.get(&id).map(|&pos| &self.films[pos])
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// The source host went down during this run; nothing else is dispatched.
    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    pub async fn enrich_all(&mut self) {
        let positions: Vec<usize> = (0..self.films.len()).collect();
        self.run(positions).await;
    }

    pub async fn enrich_one(&mut self, id: u64) -> Result<(), ScraperError> {
        let pos = *self.index.get(&id).ok_or(ScraperError::NotFound(id))?;
        self.run(vec![pos]).await;
        Ok(())
    }

    /// Enriches the given films concurrently. Unknown ids do not stop the
    /// others and are returned.
    pub async fn enrich_set(&mut self, ids: &[u64]) -> Vec<u64> {
        let mut positions = Vec::new();
        let mut missing = Vec::new();
        for &id in ids {
            match self.index.get(&id) {
                Some(&pos) if !positions.contains(&pos) => positions.push(pos),
                Some(_) => {}
                None if !missing.contains(&id) => missing.push(id),
                None => {}
            }
        }

        if !missing.is_empty() {
            warn!(?missing, "films not in the working set");
            let lines: Vec<String> = missing
                .iter()
                .map(|id| ScraperError::NotFound(*id).to_string())
                .collect();
            append(&self.log, &lines);
        }
        self.run(positions).await;
        missing
    }

    /// Appends the completed films to the bulk file and logs the result.
    pub fn write_bulk_output(&self, writer: &BulkWriter) -> Result<BulkReport, ScraperError> {
        let report = writer.write(&self.films)?;
        append(
            &self.log,
            &[
                runlog::banner("BULK TASK FILE"),
                format!("Bulk file: {}", writer.path().display()),
                format!(
                    "Number of tasks created: {}/{}",
                    report.written, self.stats.successful
                ),
                format!("Writing time: {}", runlog::seconds(report.elapsed)),
                runlog::rule(),
            ],
        );
        Ok(report)
    }

    /// Writes the closing summary and hands back the final counters.
    pub fn close(self) -> RunStats {
        let stats = self.stats;
        let mut lines = vec![runlog::banner("CLOSING SCRAPPING APP")];
        lines.extend(summary(&stats));
        lines.push(format!(
            "Total execution time: {}",
            runlog::minutes(self.started.elapsed())
        ));
        lines.push(runlog::closing_rule());
        append(&self.log, &lines);
        info!(
            processed = stats.processed(),
            successful = stats.successful,
            skipped = stats.skipped(),
            "scraper closed"
        );
        stats
    }

    async fn run(&mut self, positions: Vec<usize>) {
        let start = Instant::now();
        append(&self.log, &[runlog::banner("STARTING WEB SCRAPPING")]);
        self.dispatch(positions).await;

        let mut lines = vec![runlog::rule(), runlog::banner("SCRAPPING STATISTICS")];
        lines.push(format!(
            "Total scrapping time: {}",
            runlog::minutes(start.elapsed())
        ));
        lines.extend(summary(&self.stats));
        lines.push(runlog::rule());
        append(&self.log, &lines);
    }

    async fn dispatch(&mut self, positions: Vec<usize>) {
        // Terminal films keep their outcome.
        let positions: Vec<usize> = positions
            .into_iter()
            .filter(|&pos| {
                let pending = self.films[pos].status().is_pending();
                if !pending {
                    debug!(id = self.films[pos].id(), "already enriched, not dispatched");
                }
                pending
            })
            .collect();
        if positions.is_empty() {
            return;
        }

        let workers = self.options.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut progress = ProgressTracker::new(positions.len());
        let pb = ProgressBar::new(positions.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        let (tx, mut rx) = mpsc::channel::<Report>(workers * 2);

        for pos in positions {
            let mut film = self.films[pos].clone();
            let extractor = Arc::clone(&self.extractor);
            let sem = Arc::clone(&semaphore);
            let halt = Arc::clone(&self.halt);
            let fetch_timeout = self.options.fetch_timeout;
            let tx = tx.clone();

            tokio::spawn(async move {
                let report = match sem.acquire_owned().await {
                    Ok(permit) if !halt.load(Ordering::SeqCst) => {
                        let start = Instant::now();
                        // Inner task so a panic surfaces as a JoinError.
                        let job = tokio::spawn(async move {
                            film.enrich(&*extractor, fetch_timeout).await;
                            film
                        });
                        let report = match job.await {
                            Ok(film) => {
                                if film.status().is_server_error() {
                                    halt.store(true, Ordering::SeqCst);
                                }
                                Report::Done {
                                    pos,
                                    film,
                                    elapsed: start.elapsed(),
                                }
                            }
                            Err(e) => Report::Panicked {
                                pos,
                                elapsed: start.elapsed(),
                                reason: e.to_string(),
                            },
                        };
                        drop(permit);
                        report
                    }
                    _ => Report::Skipped { pos },
                };
                let _ = tx.send(report).await;
            });
        }

        // Drop our copy of tx so rx closes when all workers finish
        drop(tx);

        while let Some(report) = rx.recv().await {
            match report {
                Report::Done { pos, film, elapsed } => {
                    self.films[pos] = film;
                    self.settle(pos, elapsed, &mut progress);
                }
                Report::Panicked { pos, elapsed, reason } => {
                    let film = &mut self.films[pos];
                    error!(id = film.id(), %reason, "enrichment panicked");
                    if let Err(e) = film
                        .status_mut()
                        .set_error(format!("enrichment panicked: {}", reason))
                    {
                        warn!(id = film.id(), error = %e, "status left unchanged");
                    }
                    self.settle(pos, elapsed, &mut progress);
                }
                Report::Skipped { pos } => {
                    self.stats.record_skipped(self.films[pos].id());
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            successful = self.stats.successful,
            failed = self.stats.failed,
            uncompleted = self.stats.uncompleted,
            skipped = self.stats.skipped(),
            "dispatch finished"
        );
    }

    /// Counts and logs one finished film.
    fn settle(&mut self, pos: usize, elapsed: Duration, progress: &mut ProgressTracker) {
        let film = &self.films[pos];
        let status = film.status();
        self.stats.record(film.id(), Outcome::of(status), elapsed);

        let mut lines = vec![runlog::record_line(film.id(), status, elapsed)];
        if let Some(percent) = progress.advance() {
            lines.push(runlog::progress_line(percent));
        }
        if status.is_server_error() && !self.halt_reported {
            self.halt_reported = true;
            warn!(id = film.id(), url = film.url(), "source down, halting dispatch");
            lines.push(HALT_LINE.to_string());
        }
        append(&self.log, &lines);
    }
}

fn seed_stats(batch: &SeedBatch) -> Vec<String> {
    let window = batch.end().saturating_sub(batch.start);
    let mut lines = vec![
        runlog::banner("SEED DATA STATISTICS"),
        format!(
            "Rows requested: {}..{} ({} available)",
            batch.start,
            batch.start.saturating_add(batch.count),
            batch.total_rows
        ),
        format!("Successful reads: {}/{}", batch.films.len(), window),
    ];
    lines.extend(
        batch
            .rejected
            .iter()
            .map(|r| format!("Rejected row {}: {}", r.row, r.reason)),
    );
    lines.push(runlog::rule());
    lines
}

fn summary(stats: &RunStats) -> Vec<String> {
    vec![
        format!(
            "Average time per scrap: {}",
            runlog::seconds(stats.average_enrich_time())
        ),
        format!("Successful scraps: {}", stats.ratio(stats.successful)),
        format!("Uncompleted scraps: {}", stats.ratio(stats.uncompleted)),
        format!("Failed scraps: {}", stats.ratio(stats.failed)),
        format!("Skipped scraps: {}", stats.ratio(stats.skipped())),
        format!("Non-scrapped films: {:?}", stats.not_enriched),
    ]
}

/// Run-log writes never abort a run.
fn append(log: &RunLog, lines: &[String]) {
    if let Err(e) = log.write_block(lines) {
        warn!(path = %log.path().display(), error = %e, "run log write failed");
    }
}
