//! Test doubles for the page source and the seed data.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, SeedError};
use crate::extractor::{AttributeKind, AttributeValue, PageExtractor};
use crate::film::Film;
use crate::seed::{SeedBatch, SeedReader, SeedRow};

pub fn film_url(id: u64) -> String {
    format!("https://www.imdb.com/title/tt{:07}/", id)
}

pub fn seed_row(id: i64) -> SeedRow {
    SeedRow {
        id,
        url: film_url(id.unsigned_abs()),
        title: format!("Film {} (1999)", id),
        score: 7.5,
        genres: "Drama|Thriller".to_string(),
    }
}

pub fn seeded_film(id: i64) -> Film {
    seed_row(id).into_film().unwrap()
}

/// Page source answering every attribute unless told otherwise.
#[derive(Default)]
pub struct StubExtractor {
    calls: AtomicUsize,
    down_after: Option<usize>,
    down_urls: HashSet<String>,
    missing_required: HashSet<String>,
    missing: HashSet<AttributeKind>,
    release_year: Option<i32>,
    delay: Option<Duration>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self {
            release_year: Some(1999),
            ..Self::default()
        }
    }

    /// Host becomes unreachable once `calls` fetches have been served.
    pub fn down_after(mut self, calls: usize) -> Self {
        self.down_after = Some(calls);
        self
    }

    pub fn host_down(mut self, url: &str) -> Self {
        self.down_urls.insert(url.to_string());
        self
    }

    /// Synopsis and plot keywords are absent from this film's pages.
    pub fn without_required(mut self, url: &str) -> Self {
        self.missing_required.insert(url.to_string());
        self
    }

    pub fn without(mut self, kind: AttributeKind) -> Self {
        self.missing.insert(kind);
        self
    }

    pub fn with_release_year(mut self, year: i32) -> Self {
        self.release_year = Some(year);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageExtractor for StubExtractor {
    async fn fetch(
        &self,
        url: &str,
        kind: AttributeKind,
    ) -> Result<Option<AttributeValue>, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.down_urls.contains(url) || self.down_after.is_some_and(|n| call > n) {
            return Err(FetchError::HostUnreachable {
                url: url.to_string(),
                reason: "dns error: failed to lookup address".to_string(),
            });
        }

        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let required = matches!(kind, AttributeKind::Synopsis | AttributeKind::PlotKeywords);
        if self.missing.contains(&kind) || (required && self.missing_required.contains(url)) {
            return Ok(None);
        }

        let value = match kind {
            AttributeKind::ReleaseYear => AttributeValue::Year(self.release_year.unwrap_or(1999)),
            AttributeKind::Synopsis => AttributeValue::Text(format!("Synopsis of {}", url)),
            AttributeKind::OriginCountry => AttributeValue::Text("USA".to_string()),
            other => AttributeValue::List(vec![format!("{} of {}", other, url)]),
        };
        Ok(Some(value))
    }
}

/// Seed data held in memory.
pub struct VecSeedReader {
    rows: Vec<Result<SeedRow, String>>,
}

impl VecSeedReader {
    pub fn new(rows: Vec<SeedRow>) -> Self {
        Self {
            rows: rows.into_iter().map(Ok).collect(),
        }
    }

    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self::new(ids.into_iter().map(seed_row).collect())
    }

    pub fn push_malformed(&mut self, reason: &str) {
        self.rows.push(Err(reason.to_string()));
    }
}

impl SeedReader for VecSeedReader {
    fn source(&self) -> String {
        "memory".to_string()
    }

    fn read(&self, start: usize, count: usize) -> Result<SeedBatch, SeedError> {
        let mut batch = SeedBatch::new(start, count, self.rows.len());
        for (row, parsed) in self.rows.iter().enumerate().skip(start).take(count) {
            batch.accept(row, parsed.clone());
        }
        Ok(batch)
    }
}
