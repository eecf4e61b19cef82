use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "filmdb.toml";
const ENV_PREFIX: &str = "FILMDB";

/// Run settings: built-in defaults, then `filmdb.toml` if present, then
/// `FILMDB_*` environment variables. CLI flags are applied on top by `main`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub seed: PathBuf,
    pub start: usize,
    pub count: usize,
    pub log: PathBuf,
    pub bulk: PathBuf,
    pub workers: usize,
    pub fetch_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Settings {
    pub fn load(file: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("seed", "MovieGenre.csv")?
            .set_default("start", 0i64)?
            .set_default("count", 9000i64)?
            .set_default("log", "scrap_log.txt")?
            .set_default("bulk", "bulkTasks.json")?
            .set_default("workers", num_cpus::get() as i64)?
            .set_default(
                "user_agent",
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            )?
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    /// `0` disables the timeout, same as leaving it unset.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join(CONFIG_FILE)).unwrap();

        assert_eq!(settings.seed, PathBuf::from("MovieGenre.csv"));
        assert_eq!(settings.start, 0);
        assert_eq!(settings.log, PathBuf::from("scrap_log.txt"));
        assert_eq!(settings.bulk, PathBuf::from("bulkTasks.json"));
        assert_eq!(settings.workers(), num_cpus::get().max(1));
        assert_eq!(settings.fetch_timeout(), None);
        assert!(settings.user_agent.starts_with("filmdb_scraper/"));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "seed = \"films.sqlite\"\nstart = 18000\ncount = 50\nworkers = 0\nfetch_timeout_secs = 30"
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.seed, PathBuf::from("films.sqlite"));
        assert_eq!(settings.start, 18000);
        assert_eq!(settings.count, 50);
        assert_eq!(settings.workers(), 1);
        assert_eq!(settings.fetch_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.log, PathBuf::from("scrap_log.txt"));
    }
}
