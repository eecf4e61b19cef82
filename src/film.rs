use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::Datelike;
use tracing::{debug, warn};

use crate::error::{FetchError, StatusError, ValidationError};
use crate::extractor::{AttributeKind, AttributeValue, PageExtractor};
use crate::status::ScrapStatus;

/// First commercial film screening.
pub const FIRST_FILM_RELEASE_YEAR: i32 = 1895;

/// Value written for attributes the page did not provide.
pub const NOT_FOUND: &str = "None";

/// Result of looking an attribute up on the film's page.
#[derive(Debug, Clone, PartialEq)]
pub enum Scraped<T> {
    Found(T),
    NotFound,
}

impl<T> Scraped<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Scraped::Found(value) => Some(value),
            Scraped::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Scraped::Found(_))
    }
}

/// A film from the seed data, completed with the attributes scraped from its page.
///
/// Identity is the IMDb id: two films are equal iff their ids match.
/// Enrichment-only attributes are `None` until enrichment ran and afterwards
/// always hold a [`Scraped`] value.
#[derive(Debug, Clone)]
pub struct Film {
    id: u64,
    url: String,
    title: String,
    release_year: Option<i32>,
    avg_score: Option<f32>,
    genres: Vec<String>,
    synopsis: Option<Scraped<String>>,
    plot_keywords: Option<Scraped<Vec<String>>>,
    main_actors: Option<Scraped<Vec<String>>>,
    filming_locations: Option<Scraped<Vec<String>>>,
    origin_country: Option<Scraped<String>>,
    primary_languages: Option<Scraped<Vec<String>>>,
    status: ScrapStatus,
}

impl Film {
    pub fn new(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::InvalidId(id));
        }
        Ok(Self {
            id: id as u64,
            url: String::new(),
            title: String::new(),
            release_year: None,
            avg_score: None,
            genres: Vec::new(),
            synopsis: None,
            plot_keywords: None,
            main_actors: None,
            filming_locations: None,
            origin_country: None,
            primary_languages: None,
            status: ScrapStatus::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_year
    }

    pub fn avg_score(&self) -> Option<f32> {
        self.avg_score
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }

    pub fn synopsis(&self) -> Option<&Scraped<String>> {
        self.synopsis.as_ref()
    }

    pub fn plot_keywords(&self) -> Option<&Scraped<Vec<String>>> {
        self.plot_keywords.as_ref()
    }

    pub fn main_actors(&self) -> Option<&Scraped<Vec<String>>> {
        self.main_actors.as_ref()
    }

    pub fn filming_locations(&self) -> Option<&Scraped<Vec<String>>> {
        self.filming_locations.as_ref()
    }

    pub fn origin_country(&self) -> Option<&Scraped<String>> {
        self.origin_country.as_ref()
    }

    pub fn primary_languages(&self) -> Option<&Scraped<Vec<String>>> {
        self.primary_languages.as_ref()
    }

    pub fn status(&self) -> &ScrapStatus {
        &self.status
    }

    pub(crate) fn status_mut(&mut self) -> &mut ScrapStatus {
        &mut self.status
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.trim().to_string();
    }

    /// Sets the title. Titles such as "Alien (1979)" carry the release year,
    /// which is moved into `release_year`. A title with no year in
    /// parentheses leaves `release_year` untouched.
    pub fn set_title(&mut self, title: &str) -> Result<(), ValidationError> {
        if let Some((name, rest)) = title.split_once('(') {
            let digits: String = rest.chars().filter(|c| !c.is_whitespace()).take(4).collect();
            if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(year) = digits.parse::<i32>() {
                    self.set_release_year(year)?;
                    self.title = name.trim().to_string();
                    return Ok(());
                }
            }
        }
        self.title = title.trim().to_string();
        Ok(())
    }

    pub fn set_release_year(&mut self, year: i32) -> Result<(), ValidationError> {
        let max = current_year();
        if !(FIRST_FILM_RELEASE_YEAR..=max).contains(&year) {
            return Err(ValidationError::ReleaseYearOutOfRange {
                year,
                min: FIRST_FILM_RELEASE_YEAR,
                max,
            });
        }
        self.release_year = Some(year);
        Ok(())
    }

    pub fn set_avg_score(&mut self, score: f32) -> Result<(), ValidationError> {
        if !(0.0..=10.0).contains(&score) {
            return Err(ValidationError::AvgScoreOutOfRange(score));
        }
        self.avg_score = Some(score);
        Ok(())
    }

    pub fn set_genres(&mut self, genres: Vec<String>) {
        self.genres = genres;
    }

    pub fn set_synopsis(&mut self, synopsis: Option<String>) {
        self.synopsis = Some(scraped_text(synopsis));
    }

    pub fn set_origin_country(&mut self, country: Option<String>) {
        self.origin_country = Some(scraped_text(country));
    }

    pub fn set_plot_keywords(&mut self, keywords: Option<Vec<String>>) {
        self.plot_keywords = Some(scraped_list(keywords));
    }

    pub fn set_main_actors(&mut self, actors: Option<Vec<String>>) {
        self.main_actors = Some(scraped_list(actors));
    }

    pub fn set_filming_locations(&mut self, locations: Option<Vec<String>>) {
        self.filming_locations = Some(scraped_list(locations));
    }

    pub fn set_primary_languages(&mut self, languages: Option<Vec<String>>) {
        self.primary_languages = Some(scraped_list(languages));
    }

    /// Seed fields (url, title, score, genres) are present and valid.
    pub fn check_seed_values(&self) -> bool {
        !self.url.is_empty()
            && !self.title.is_empty()
            && self.avg_score.is_some()
            && !self.genres.is_empty()
    }

    /// At least one of synopsis or first plot keyword was found.
    /// Otherwise returns the first missing one.
    pub fn check_required_attributes(&self) -> Result<(), AttributeKind> {
        let has_synopsis = self.synopsis.as_ref().is_some_and(Scraped::is_found);
        let has_keyword = self
            .plot_keywords
            .as_ref()
            .and_then(Scraped::found)
            .and_then(|k| k.first())
            .is_some_and(|k| !k.is_empty());

        match (has_synopsis, has_keyword) {
            (false, false) => Err(AttributeKind::Synopsis),
            _ => Ok(()),
        }
    }

    /// Scrapes the attributes the seed data lacks and settles the status.
    ///
    /// Does nothing unless the status is `NotCompleted` and the seed values
    /// check out. Ends in `Completed`, or `Error` when required attributes are
    /// missing or the host is unreachable.
    pub async fn enrich<E>(&mut self, extractor: &E, fetch_timeout: Option<Duration>)
    where
        E: PageExtractor + ?Sized,
    {
        if !self.status.is_pending() {
            debug!(id = self.id, status = %self.status, "film already enriched");
            return;
        }
        if !self.check_seed_values() {
            warn!(id = self.id, "seed values incomplete, enrichment skipped");
            return;
        }

        let mut failures: Vec<(AttributeKind, FetchError)> = Vec::new();
        let kinds = self
            .release_year
            .is_none()
            .then_some(AttributeKind::ReleaseYear)
            .into_iter()
            .chain(AttributeKind::ENRICHED);

        for kind in kinds {
            match fetch_attribute(extractor, &self.url, kind, fetch_timeout).await {
                Ok(value) => self.apply(kind, value),
                Err(err) if err.is_systemic() => {
                    warn!(id = self.id, error = %err, "source unreachable");
                    let result = self.status.set_server_error();
                    self.log_transition(result);
                    return;
                }
                Err(err) => {
                    warn!(id = self.id, attribute = %kind, error = %err, "attribute fetch failed");
                    self.apply(kind, None);
                    failures.push((kind, err));
                }
            }
        }

        let result = match self.check_required_attributes() {
            Ok(()) => self.status.set_completed(),
            Err(missing) => {
                let message = match failures.iter().find(|(kind, _)| *kind == missing) {
                    Some((_, err)) => format!("missing required attribute: {} ({})", missing, err),
                    None => format!("missing required attribute: {}", missing),
                };
                self.status.set_error(message)
            }
        };
        self.log_transition(result);
    }

    fn apply(&mut self, kind: AttributeKind, value: Option<AttributeValue>) {
        match kind {
            AttributeKind::ReleaseYear => {
                if let Some(AttributeValue::Year(year)) = value {
                    if let Err(err) = self.set_release_year(year) {
                        warn!(id = self.id, error = %err, "ignoring scraped release year");
                    }
                }
            }
            AttributeKind::Synopsis => self.set_synopsis(value.and_then(AttributeValue::into_text)),
            AttributeKind::OriginCountry => {
                self.set_origin_country(value.and_then(AttributeValue::into_text))
            }
            AttributeKind::MainActors => {
                self.set_main_actors(value.and_then(AttributeValue::into_list))
            }
            AttributeKind::PlotKeywords => {
                self.set_plot_keywords(value.and_then(AttributeValue::into_list))
            }
            AttributeKind::FilmingLocations => {
                self.set_filming_locations(value.and_then(AttributeValue::into_list))
            }
            AttributeKind::PrimaryLanguages => {
                self.set_primary_languages(value.and_then(AttributeValue::into_list))
            }
        }
    }

    fn log_transition(&self, result: Result<(), StatusError>) {
        if let Err(err) = result {
            warn!(id = self.id, error = %err, "status left unchanged");
        }
    }
}

impl PartialEq for Film {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Film {}

impl Hash for Film {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Splits a pipe-delimited genre field, e.g. "Action|Sci-Fi".
pub fn split_genres(field: &str) -> Vec<String> {
    field
        .split('|')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn scraped_text(value: Option<String>) -> Scraped<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Scraped::Found(text),
        _ => Scraped::NotFound,
    }
}

fn scraped_list(value: Option<Vec<String>>) -> Scraped<Vec<String>> {
    match value {
        Some(items) if !items.is_empty() => Scraped::Found(items),
        _ => Scraped::NotFound,
    }
}

async fn fetch_attribute<E>(
    extractor: &E,
    url: &str,
    kind: AttributeKind,
    fetch_timeout: Option<Duration>,
) -> Result<Option<AttributeValue>, FetchError>
where
    E: PageExtractor + ?Sized,
{
    match fetch_timeout {
        Some(limit) => tokio::time::timeout(limit, extractor.fetch(url, kind))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Timeout {
                    url: url.to_string(),
                })
            }),
        None => extractor.fetch(url, kind).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seeded_film, StubExtractor};

    #[test]
    fn rejects_non_positive_id() {
        assert_eq!(Film::new(0).unwrap_err(), ValidationError::InvalidId(0));
        assert_eq!(Film::new(-5).unwrap_err(), ValidationError::InvalidId(-5));
        assert_eq!(Film::new(1).unwrap().id(), 1);
    }

    #[test]
    fn title_with_year() {
        let mut film = Film::new(78748).unwrap();
        film.set_title("Alien (1979)").unwrap();
        assert_eq!(film.title(), "Alien");
        assert_eq!(film.release_year(), Some(1979));
    }

    #[test]
    fn title_without_year_keeps_release_year() {
        let mut film = Film::new(78748).unwrap();
        film.set_release_year(1979).unwrap();
        film.set_title("Alien").unwrap();
        assert_eq!(film.title(), "Alien");
        assert_eq!(film.release_year(), Some(1979));

        film.set_title("Alien (Director's Cut)").unwrap();
        assert_eq!(film.title(), "Alien (Director's Cut)");
        assert_eq!(film.release_year(), Some(1979));
    }

    #[test]
    fn title_with_out_of_range_year() {
        let mut film = Film::new(1).unwrap();
        let err = film.set_title("Roundhay Garden Scene (1888)").unwrap_err();
        assert!(matches!(err, ValidationError::ReleaseYearOutOfRange { year: 1888, .. }));
        assert_eq!(film.title(), "");
        assert_eq!(film.release_year(), None);
    }

    #[test]
    fn title_with_spaced_year() {
        let mut film = Film::new(1).unwrap();
        film.set_title("Toy Story ( 1995 )").unwrap();
        assert_eq!(film.title(), "Toy Story");
        assert_eq!(film.release_year(), Some(1995));
    }

    #[test]
    fn avg_score_bounds_are_inclusive() {
        let mut film = Film::new(1).unwrap();
        assert!(film.set_avg_score(10.01).is_err());
        assert!(film.set_avg_score(-0.01).is_err());
        assert!(film.set_avg_score(f32::NAN).is_err());
        assert_eq!(film.avg_score(), None);

        film.set_avg_score(0.0).unwrap();
        assert_eq!(film.avg_score(), Some(0.0));
        film.set_avg_score(10.0).unwrap();
        assert_eq!(film.avg_score(), Some(10.0));
    }

    #[test]
    fn release_year_bounds() {
        let mut film = Film::new(1).unwrap();
        assert!(film.set_release_year(1894).is_err());
        film.set_release_year(1895).unwrap();
        assert_eq!(film.release_year(), Some(1895));
        assert!(film.set_release_year(current_year() + 1).is_err());
        film.set_release_year(current_year()).unwrap();
    }

    #[test]
    fn identity_is_the_id() {
        let mut a = Film::new(42).unwrap();
        a.set_title("Alien (1979)").unwrap();
        let mut b = Film::new(42).unwrap();
        b.set_title("Aliens (1986)").unwrap();
        b.set_avg_score(8.4).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Film::new(43).unwrap());
    }

    #[test]
    fn missing_optional_values_become_not_found() {
        let mut film = Film::new(1).unwrap();
        film.set_main_actors(None);
        film.set_filming_locations(Some(Vec::new()));
        film.set_origin_country(Some("  ".into()));
        film.set_primary_languages(Some(vec!["English".into()]));

        assert_eq!(film.main_actors(), Some(&Scraped::NotFound));
        assert_eq!(film.filming_locations(), Some(&Scraped::NotFound));
        assert_eq!(film.origin_country(), Some(&Scraped::NotFound));
        assert_eq!(
            film.primary_languages(),
            Some(&Scraped::Found(vec!["English".to_string()]))
        );
    }

    #[test]
    fn genres_split_on_pipes() {
        assert_eq!(
            split_genres(" Action|Sci-Fi | |Horror "),
            vec!["Action", "Sci-Fi", "Horror"]
        );
        assert!(split_genres("").is_empty());
    }

    #[test]
    fn seed_values_check() {
        let film = seeded_film(1);
        assert!(film.check_seed_values());

        let mut no_genres = seeded_film(2);
        no_genres.set_genres(Vec::new());
        assert!(!no_genres.check_seed_values());

        let mut no_score = Film::new(3).unwrap();
        no_score.set_url("https://www.imdb.com/title/tt3/");
        no_score.set_title("Film (1999)").unwrap();
        no_score.set_genres(vec!["Drama".into()]);
        assert!(!no_score.check_seed_values());
    }

    #[tokio::test]
    async fn enrich_completes() {
        let extractor = StubExtractor::new();
        let mut film = seeded_film(1);
        film.enrich(&extractor, None).await;

        assert!(film.status().is_completed());
        assert!(film.synopsis().is_some_and(Scraped::is_found));
        assert!(film.main_actors().is_some_and(Scraped::is_found));
        // Year came from the title, so it is not fetched.
        assert_eq!(extractor.calls(), AttributeKind::ENRICHED.len());
    }

    #[tokio::test]
    async fn enrich_fetches_missing_release_year() {
        let extractor = StubExtractor::new().with_release_year(1979);
        let mut film = seeded_film(1);
        film.set_title("Alien").unwrap();
        film.release_year = None;
        film.enrich(&extractor, None).await;

        assert_eq!(film.release_year(), Some(1979));
        assert_eq!(extractor.calls(), AttributeKind::ENRICHED.len() + 1);
    }

    #[tokio::test]
    async fn enrich_ignores_invalid_scraped_year() {
        let extractor = StubExtractor::new().with_release_year(1500);
        let mut film = seeded_film(1);
        film.release_year = None;
        film.enrich(&extractor, None).await;

        assert_eq!(film.release_year(), None);
        assert!(film.status().is_completed());
    }

    #[tokio::test]
    async fn enrich_accepts_either_required_attribute() {
        let extractor = StubExtractor::new().without(AttributeKind::Synopsis);
        let mut film = seeded_film(1);
        film.enrich(&extractor, None).await;
        assert!(film.status().is_completed());
        assert_eq!(film.synopsis(), Some(&Scraped::NotFound));

        let extractor = StubExtractor::new().without(AttributeKind::PlotKeywords);
        let mut film = seeded_film(2);
        film.enrich(&extractor, None).await;
        assert!(film.status().is_completed());
    }

    #[tokio::test]
    async fn enrich_errors_without_required_attributes() {
        let film_url = seeded_film(7).url().to_string();
        let extractor = StubExtractor::new().without_required(&film_url);
        let mut film = seeded_film(7);
        film.enrich(&extractor, None).await;

        assert!(film.status().is_error());
        assert!(!film.status().is_server_error());
        assert_eq!(film.status().message(), "missing required attribute: synopsis");
        // Optional attributes are still filled in.
        assert!(film.origin_country().is_some_and(Scraped::is_found));
    }

    #[tokio::test]
    async fn enrich_marks_server_error() {
        let film_url = seeded_film(3).url().to_string();
        let extractor = StubExtractor::new().host_down(&film_url);
        let mut film = seeded_film(3);
        film.enrich(&extractor, None).await;

        assert!(film.status().is_server_error());
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn enrich_requires_seed_values() {
        let extractor = StubExtractor::new();
        let mut film = Film::new(9).unwrap();
        film.set_title("Untitled").unwrap();
        film.enrich(&extractor, None).await;

        assert!(film.status().is_pending());
        assert_eq!(extractor.calls(), 0);
        assert!(film.synopsis().is_none());
    }

    #[tokio::test]
    async fn enrich_runs_once() {
        let extractor = StubExtractor::new();
        let mut film = seeded_film(1);
        film.enrich(&extractor, None).await;
        let calls = extractor.calls();
        film.enrich(&extractor, None).await;

        assert!(film.status().is_completed());
        assert_eq!(extractor.calls(), calls);
    }

    #[tokio::test]
    async fn slow_fetch_times_out_as_local_failure() {
        let extractor = StubExtractor::new().with_delay(Duration::from_millis(200));
        let mut film = seeded_film(1);
        film.enrich(&extractor, Some(Duration::from_millis(10))).await;

        assert!(film.status().is_error());
        assert!(!film.status().is_server_error());
        assert!(film.status().message().contains("timed out"));
    }
}
