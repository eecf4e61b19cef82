use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::status::ScrapStatus;

const WIDTH: usize = 37;

/// Human-readable run log, appended to across runs.
///
/// Every block goes out under a single lock, so lines from concurrent
/// writers never interleave.
pub struct RunLog {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
}

impl RunLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_block<S: AsRef<str>>(&self, lines: &[S]) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        for line in lines {
            out.write_all(line.as_ref().as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        self.write_block(&[line])
    }
}

/// `-----|TITLE|-----...` padded with dashes to the rule width.
pub fn banner(title: &str) -> String {
    let head = format!("-----|{}|", title);
    let pad = WIDTH.saturating_sub(head.len()).max(5);
    format!("{}{}", head, "-".repeat(pad))
}

pub fn rule() -> String {
    "-".repeat(WIDTH)
}

pub fn closing_rule() -> String {
    "=".repeat(WIDTH + 1)
}

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn seconds(d: Duration) -> String {
    format!("{:.2} seconds", d.as_secs_f64())
}

pub fn minutes(d: Duration) -> String {
    format!("{:.2} minutes", d.as_secs_f64() / 60.0)
}

/// One line per enriched film, worded after its final status. Only
/// completed films carry their enrichment time.
pub fn record_line(id: u64, status: &ScrapStatus, elapsed: Duration) -> String {
    let body = match status {
        ScrapStatus::Completed => format!("Scrapped: {} ({})", id, seconds(elapsed)),
        ScrapStatus::Error(_) => format!("ERROR scrapping: {} ({})", id, status.message()),
        ScrapStatus::NotCompleted => {
            format!("INCOMPLETE scrapping: {} ({})", id, status.message())
        }
    };
    format!("[{}] {}", timestamp(), body)
}

pub fn progress_line(percent: u32) -> String {
    format!("Progress: {}%", percent)
}
