use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::ScraperError;
use crate::film::{Film, Scraped, NOT_FOUND};

const ACTION_HEADER: &str = r#"{"index":{}}"#;

/// Outcome of one bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkReport {
    pub written: usize,
    pub completed: usize,
    pub elapsed: Duration,
}

/// Document indexed for each completed film. Attributes the page did not
/// provide are written as `"None"` (or `["None"]` for lists).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilmDocument<'a> {
    #[serde(rename = "imdbID")]
    imdb_id: u64,
    title: &'a str,
    synopsis: &'a str,
    origin_country: &'a str,
    release_year: Option<i32>,
    avg_score: Option<f32>,
    genres: &'a [String],
    main_actors: Vec<&'a str>,
    plot_keywords: Vec<&'a str>,
    filming_locations: Vec<&'a str>,
    primary_languages: Vec<&'a str>,
}

impl<'a> From<&'a Film> for FilmDocument<'a> {
    fn from(film: &'a Film) -> Self {
        Self {
            imdb_id: film.id(),
            title: film.title(),
            synopsis: text(film.synopsis()),
            origin_country: text(film.origin_country()),
            release_year: film.release_year(),
            avg_score: film.avg_score(),
            genres: film.genres(),
            main_actors: list(film.main_actors()),
            plot_keywords: list(film.plot_keywords()),
            filming_locations: list(film.filming_locations()),
            primary_languages: list(film.primary_languages()),
        }
    }
}

fn text(value: Option<&Scraped<String>>) -> &str {
    match value {
        Some(Scraped::Found(text)) => text,
        _ => NOT_FOUND,
    }
}

fn list(value: Option<&Scraped<Vec<String>>>) -> Vec<&str> {
    match value {
        Some(Scraped::Found(items)) => items.iter().map(String::as_str).collect(),
        _ => vec![NOT_FOUND],
    }
}

/// Appends `{"index":{}}` + document line pairs for a search-index bulk load.
pub struct BulkWriter {
    path: PathBuf,
}

impl BulkWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every completed film in working-set order. No file is touched
    /// when nothing completed.
    pub fn write(&self, films: &[Film]) -> Result<BulkReport, ScraperError> {
        let start = Instant::now();
        let completed: Vec<&Film> = films.iter().filter(|f| f.status().is_completed()).collect();
        if completed.is_empty() {
            info!(path = %self.path.display(), "no completed films, bulk file not written");
            return Ok(BulkReport {
                written: 0,
                completed: 0,
                elapsed: start.elapsed(),
            });
        }

        let documents: Vec<String> = completed
            .par_iter()
            .map(|film| serde_json::to_string(&FilmDocument::from(*film)))
            .collect::<Result<_, serde_json::Error>>()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        for doc in &documents {
            writeln!(out, "{}", ACTION_HEADER)?;
            writeln!(out, "{}", doc)?;
        }
        out.flush()?;

        let report = BulkReport {
            written: documents.len(),
            completed: completed.len(),
            elapsed: start.elapsed(),
        };
        info!(
            path = %self.path.display(),
            written = report.written,
            "bulk file written"
        );
        Ok(report)
    }
}
