use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use csv::StringRecord;
use serde::Deserialize;
use tracing::{debug, info};

use crate::db;
use crate::error::{SeedError, ValidationError};
use crate::film::{split_genres, Film};

/// One seed dataset row, laid out like the MovieGenre CSV export.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRow {
    #[serde(rename = "imdbId")]
    pub id: i64,
    #[serde(rename = "Imdb Link")]
    pub url: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "IMDB Score")]
    pub score: f32,
    #[serde(rename = "Genre")]
    pub genres: String,
}

impl SeedRow {
    pub fn into_film(self) -> Result<Film, ValidationError> {
        let mut film = Film::new(self.id)?;
        film.set_url(&self.url);
        film.set_title(&self.title)?;
        film.set_avg_score(self.score)?;
        film.set_genres(split_genres(&self.genres));
        Ok(film)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub row: usize,
    pub reason: String,
}

/// Draft films read from a window `[start, start + count)` of the seed rows.
#[derive(Debug)]
pub struct SeedBatch {
    pub start: usize,
    pub count: usize,
    pub total_rows: usize,
    pub films: Vec<Film>,
    pub rejected: Vec<RejectedRow>,
    seen: HashSet<u64>,
}

impl SeedBatch {
    pub fn new(start: usize, count: usize, total_rows: usize) -> Self {
        Self {
            start,
            count,
            total_rows,
            films: Vec::new(),
            rejected: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Converts a parsed row into a film; invalid or duplicate rows are
    /// recorded as rejected and never stop the read.
    pub fn accept(&mut self, row: usize, parsed: Result<SeedRow, String>) {
        let film = parsed
            .map_err(ValidationError::MalformedRow)
            .and_then(SeedRow::into_film)
            .and_then(|film| {
                if self.seen.insert(film.id()) {
                    Ok(film)
                } else {
                    Err(ValidationError::DuplicateId(film.id()))
                }
            });

        match film {
            Ok(film) => self.films.push(film),
            Err(err) => {
                debug!(row, error = %err, "seed row rejected");
                self.rejected.push(RejectedRow {
                    row,
                    reason: err.to_string(),
                });
            }
        }
    }

    /// End of the requested window, clamped to the rows available.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.count).min(self.total_rows)
    }
}

/// Source of the draft films.
pub trait SeedReader {
    /// Identifier written to the run log.
    fn source(&self) -> String;

    fn read(&self, start: usize, count: usize) -> Result<SeedBatch, SeedError>;
}

/// Picks a reader from the file extension.
pub fn open(path: &Path) -> Result<Box<dyn SeedReader>, SeedError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => Ok(Box::new(CsvSeedReader::new(path))),
        Some("sqlite" | "sqlite3" | "db") => Ok(Box::new(SqliteSeedReader::new(path))),
        Some("xlsx" | "xlsm" | "xls") => Ok(Box::new(XlsxSeedReader::new(path))),
        _ => Err(SeedError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// MovieGenre CSV: `imdbId,Imdb Link,Title,IMDB Score,Genre[,Poster]`.
pub struct CsvSeedReader {
    path: PathBuf,
}

impl CsvSeedReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SeedReader for CsvSeedReader {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self, start: usize, count: usize) -> Result<SeedBatch, SeedError> {
        let file = File::open(&self.path).map_err(|source| SeedError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = lossy(reader.byte_headers()?);

        // The export is not always valid UTF-8; decode lossily instead of
        // rejecting whole rows over one accented title.
        let mut window = Vec::new();
        let mut total_rows = 0;
        for (row, record) in reader.byte_records().enumerate() {
            total_rows += 1;
            if row < start || row - start >= count {
                continue;
            }
            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|r| lossy(&r).deserialize::<SeedRow>(Some(&headers)).map_err(|e| e.to_string()));
            window.push((row, parsed));
        }

        let mut batch = SeedBatch::new(start, count, total_rows);
        for (row, parsed) in window {
            batch.accept(row, parsed);
        }
        info!(
            source = %self.path.display(),
            loaded = batch.films.len(),
            rejected = batch.rejected.len(),
            "seed CSV read"
        );
        Ok(batch)
    }
}

fn lossy(record: &csv::ByteRecord) -> StringRecord {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

/// `films` table in a SQLite database.
pub struct SqliteSeedReader {
    path: PathBuf,
}

impl SqliteSeedReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SeedReader for SqliteSeedReader {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self, start: usize, count: usize) -> Result<SeedBatch, SeedError> {
        // Opening a missing path would create an empty database.
        if !self.path.is_file() {
            return Err(SeedError::Open {
                path: self.path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let conn = db::connect(&self.path)?;
        let total_rows = db::count_films(&conn)?;
        let rows = db::fetch_seed_rows(&conn, start, count)?;

        let mut batch = SeedBatch::new(start, count, total_rows);
        for (offset, parsed) in rows.into_iter().enumerate() {
            batch.accept(start + offset, parsed);
        }
        info!(
            source = %self.path.display(),
            loaded = batch.films.len(),
            rejected = batch.rejected.len(),
            "seed database read"
        );
        Ok(batch)
    }
}

/// First worksheet of a MovieGenre workbook; the columns are positional
/// (id, link, title, score, genre) below one header row.
pub struct XlsxSeedReader {
    path: PathBuf,
}

impl XlsxSeedReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SeedReader for XlsxSeedReader {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self, start: usize, count: usize) -> Result<SeedBatch, SeedError> {
        if !self.path.is_file() {
            return Err(SeedError::Open {
                path: self.path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let mut workbook = open_workbook_auto(&self.path)?;
        let sheet = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| SeedError::NoWorksheet(self.path.clone()))??;

        let total_rows = sheet.height().saturating_sub(1);
        let mut batch = SeedBatch::new(start, count, total_rows);
        for (row, cells) in sheet.rows().skip(1).enumerate().skip(start).take(count) {
            batch.accept(row, xlsx_row(cells));
        }
        info!(
            source = %self.path.display(),
            loaded = batch.films.len(),
            rejected = batch.rejected.len(),
            "seed workbook read"
        );
        Ok(batch)
    }
}

fn xlsx_row(cells: &[Data]) -> Result<SeedRow, String> {
    let id = match cell(cells, 0, "imdbId")? {
        Data::Int(n) => *n,
        Data::Float(f) if f.fract() == 0.0 => *f as i64,
        Data::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("column imdbId is not an integer: '{}'", s))?,
        other => return Err(format!("column imdbId is not an integer: {}", other)),
    };
    let score = match cell(cells, 3, "IMDB Score")? {
        Data::Float(f) => *f as f32,
        Data::Int(n) => *n as f32,
        Data::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("column IMDB Score is not a number: '{}'", s))?,
        other => return Err(format!("column IMDB Score is not a number: {}", other)),
    };

    Ok(SeedRow {
        id,
        url: cell_text(cells, 1, "Imdb Link")?,
        title: cell_text(cells, 2, "Title")?,
        score,
        genres: cell_text(cells, 4, "Genre")?,
    })
}

fn cell<'a>(cells: &'a [Data], i: usize, name: &str) -> Result<&'a Data, String> {
    match cells.get(i) {
        None | Some(Data::Empty) => Err(format!("missing column {}", name)),
        Some(value) => Ok(value),
    }
}

fn cell_text(cells: &[Data], i: usize, name: &str) -> Result<String, String> {
    match cell(cells, i, name)? {
        Data::String(s) => Ok(s.clone()),
        Data::Int(n) => Ok(n.to_string()),
        Data::Float(f) => Ok(f.to_string()),
        other => Err(format!("column {} is not text: {}", name, other)),
    }
}
