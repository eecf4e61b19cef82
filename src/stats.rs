use std::collections::HashSet;
use std::time::Duration;

use crate::status::ScrapStatus;

/// How one enrichment ended, as counted in the run statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Successful,
    Uncompleted,
    Failed,
}

impl Outcome {
    pub fn of(status: &ScrapStatus) -> Self {
        if status.is_completed() {
            Outcome::Successful
        } else if status.is_error() {
            Outcome::Failed
        } else {
            Outcome::Uncompleted
        }
    }
}

/// Counters for one scraper. Only the dispatch aggregator mutates them.
///
/// A film is counted once. Films left pending (skipped after a halt, or
/// uncompleted) can be dispatched again; their earlier count is withdrawn
/// when the new outcome is recorded.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub total: usize,
    pub successful: usize,
    pub uncompleted: usize,
    pub failed: usize,
    pub not_enriched: Vec<u64>,
    pub enrich_time: Duration,
    /// Films never dispatched because the run was halted.
    skipped: HashSet<u64>,
    pending: HashSet<u64>,
}

impl RunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, id: u64, outcome: Outcome, elapsed: Duration) {
        self.withdraw(id);
        self.enrich_time += elapsed;
        match outcome {
            Outcome::Successful => self.successful += 1,
            Outcome::Uncompleted => {
                self.uncompleted += 1;
                self.pending.insert(id);
                self.not_enriched.push(id);
            }
            Outcome::Failed => {
                self.failed += 1;
                self.not_enriched.push(id);
            }
        }
    }

    pub fn record_skipped(&mut self, id: u64) {
        if self.pending.contains(&id) || !self.skipped.insert(id) {
            return;
        }
        self.not_enriched.push(id);
    }

    pub fn skipped(&self) -> usize {
        self.skipped.len()
    }

    /// Films that reached a counted outcome.
    pub fn processed(&self) -> usize {
        self.successful + self.uncompleted + self.failed
    }

    /// Accumulated enrichment time over successful films; zero without any.
    pub fn average_enrich_time(&self) -> Duration {
        match u32::try_from(self.successful) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.enrich_time / n,
        }
    }

    pub fn ratio(&self, part: usize) -> String {
        format!("{}/{}", part, self.total)
    }

    fn withdraw(&mut self, id: u64) {
        let was_skipped = self.skipped.remove(&id);
        let was_pending = self.pending.remove(&id);
        if was_pending {
            self.uncompleted -= 1;
        }
        if was_skipped || was_pending {
            self.not_enriched.retain(|&n| n != id);
        }
    }
}

/// Integer percentage rounded down.
pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part.min(total) * 100 / total) as u32
}

/// Emits a percentage only when it rose since the last emission.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    done: usize,
    last: u32,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            last: 0,
        }
    }

    pub fn advance(&mut self) -> Option<u32> {
        self.done += 1;
        let now = percent(self.done, self.total);
        if now > self.last {
            self.last = now;
            Some(now)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ScrapFailure;

    #[test]
    fn outcome_from_status() {
        assert_eq!(Outcome::of(&ScrapStatus::Completed), Outcome::Successful);
        assert_eq!(Outcome::of(&ScrapStatus::NotCompleted), Outcome::Uncompleted);
        assert_eq!(
            Outcome::of(&ScrapStatus::Error(ScrapFailure::ServerDown)),
            Outcome::Failed
        );
    }

    #[test]
    fn counts_and_not_enriched() {
        let mut stats = RunStats::new(5);
        stats.record(1, Outcome::Successful, Duration::from_secs(2));
        stats.record(2, Outcome::Failed, Duration::from_secs(1));
        stats.record(3, Outcome::Uncompleted, Duration::ZERO);
        stats.record(4, Outcome::Successful, Duration::from_secs(3));
        stats.record_skipped(5);

        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.uncompleted, 1);
        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.processed(), 4);
        assert_eq!(stats.not_enriched, [2, 3, 5]);
        assert_eq!(stats.ratio(stats.successful), "2/5");
        assert_eq!(stats.average_enrich_time(), Duration::from_secs(3));
    }

    #[test]
    fn redispatched_films_count_once() {
        let mut stats = RunStats::new(3);
        stats.record(1, Outcome::Failed, Duration::ZERO);
        stats.record_skipped(2);
        stats.record_skipped(2);
        stats.record_skipped(3);
        stats.record_skipped(3);
        assert_eq!(stats.skipped(), 2);
        assert_eq!(stats.not_enriched, [1, 2, 3]);

        // A later dispatch settles a skipped film.
        stats.record(2, Outcome::Successful, Duration::from_secs(1));
        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.not_enriched, [1, 3]);

        // Uncompleted films are pending too and are recounted, not added.
        stats.record(3, Outcome::Uncompleted, Duration::ZERO);
        stats.record(3, Outcome::Uncompleted, Duration::ZERO);
        stats.record_skipped(3);
        assert_eq!(stats.uncompleted, 1);
        assert_eq!(stats.skipped(), 0);
        assert_eq!(stats.not_enriched, [1, 3]);
        assert_eq!(stats.processed(), 3);
    }

    #[test]
    fn average_without_successes_is_zero() {
        let mut stats = RunStats::new(1);
        stats.record(1, Outcome::Failed, Duration::from_secs(4));
        assert_eq!(stats.average_enrich_time(), Duration::ZERO);
    }

    #[test]
    fn percent_rounds_down() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn progress_only_increases() {
        let mut progress = ProgressTracker::new(300);
        let emitted: Vec<u32> = (0..300).filter_map(|_| progress.advance()).collect();
        assert_eq!(emitted, (1..=100).collect::<Vec<_>>());

        let mut small = ProgressTracker::new(3);
        assert_eq!(small.advance(), Some(33));
        assert_eq!(small.advance(), Some(66));
        assert_eq!(small.advance(), Some(100));
        assert_eq!(small.advance(), None);
    }
}
