use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use moka::sync::Cache;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{AttributeKind, AttributeValue, PageExtractor};
use crate::error::FetchError;

/// Main pages are fetched once per film and reused for the attributes they hold.
const MAIN_PAGE_CACHE: u64 = 256;
const NO_SYNOPSIS_MARKER: &str = "It looks like we don't have a Synopsis for this title yet";

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());

static RELEASE_DATES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[title='See more release dates'], a[href*='releaseinfo']").unwrap()
});
static COUNTRY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='country_of_origin']").unwrap());
static LANGUAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='primary_language']").unwrap());
static CAST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.cast_list a[href*='/name/']").unwrap());
static SYNOPSIS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li[id^='synopsis-']").unwrap());
static SUMMARY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li[id^='summary-']").unwrap());
static KEYWORD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href^='/search/keyword']").unwrap());
static LOCATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='locations=']").unwrap());

/// Scrapes film attributes from IMDb title pages and their sub-pages.
pub struct ImdbExtractor {
    client: reqwest::Client,
    pages: Cache<String, Arc<String>>,
}

impl ImdbExtractor {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            pages: Cache::new(MAIN_PAGE_CACHE),
        })
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|e| classify(url, e))
    }

    async fn main_page(&self, url: &str) -> Result<Arc<String>, FetchError> {
        if let Some(body) = self.pages.get(url) {
            return Ok(body);
        }
        let body = Arc::new(self.get(url).await?);
        self.pages.insert(url.to_string(), Arc::clone(&body));
        Ok(body)
    }

    async fn sub_page(&self, url: &str, page: &str) -> Result<String, FetchError> {
        self.get(&sub_page_url(url, page)).await
    }
}

#[async_trait]
impl PageExtractor for ImdbExtractor {
    async fn fetch(
        &self,
        url: &str,
        kind: AttributeKind,
    ) -> Result<Option<AttributeValue>, FetchError> {
        let value = match kind {
            AttributeKind::ReleaseYear => {
                parse_release_year(&self.main_page(url).await?).map(AttributeValue::Year)
            }
            AttributeKind::OriginCountry => {
                parse_origin_country(&self.main_page(url).await?).map(AttributeValue::Text)
            }
            AttributeKind::PrimaryLanguages => {
                parse_primary_languages(&self.main_page(url).await?).map(AttributeValue::List)
            }
            AttributeKind::MainActors => {
                parse_main_actors(&self.sub_page(url, "fullcredits").await?)
                    .map(AttributeValue::List)
            }
            AttributeKind::Synopsis => {
                parse_synopsis(&self.sub_page(url, "plotsummary").await?).map(AttributeValue::Text)
            }
            AttributeKind::PlotKeywords => {
                parse_plot_keywords(&self.sub_page(url, "keywords").await?)
                    .map(AttributeValue::List)
            }
            AttributeKind::FilmingLocations => {
                parse_filming_locations(&self.sub_page(url, "locations").await?)
                    .map(AttributeValue::List)
            }
        };
        Ok(value)
    }
}

/// Connect failures (DNS included) mean the host is gone for every film.
fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_connect() {
        FetchError::HostUnreachable {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

fn sub_page_url(url: &str, page: &str) -> String {
    let base = url.split('?').next().unwrap_or(url).trim_end_matches('/');
    format!("{}/{}", base, page)
}

/// First 4-digit run in a date string, e.g. "18 May 1979 (USA)" -> 1979.
pub fn parse_year(date: &str) -> Option<i32> {
    YEAR_RE.find(date)?.as_str().parse().ok()
}

fn parse_release_year(html: &str) -> Option<i32> {
    let doc = Html::parse_document(html);
    doc.select(&RELEASE_DATES)
        .find_map(|el| parse_year(&text_content(&el)))
}

fn parse_origin_country(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&COUNTRY)
        .map(|el| text_content(&el))
        .find(|t| !t.is_empty())
}

fn parse_primary_languages(html: &str) -> Option<Vec<String>> {
    collect_texts(html, &LANGUAGE)
}

fn parse_main_actors(html: &str) -> Option<Vec<String>> {
    collect_texts(html, &CAST)
}

fn parse_plot_keywords(html: &str) -> Option<Vec<String>> {
    collect_texts(html, &KEYWORD)
}

fn parse_filming_locations(html: &str) -> Option<Vec<String>> {
    collect_texts(html, &LOCATION)
}

/// Full synopsis when written, otherwise the first short summary.
fn parse_synopsis(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let synopsis = doc.select(&SYNOPSIS).next().map(|el| text_content(&el));

    match synopsis {
        Some(text) if !text.is_empty() && !text.contains(NO_SYNOPSIS_MARKER) => Some(text),
        _ => doc
            .select(&SUMMARY)
            .next()
            .and_then(|li| li.children().filter_map(ElementRef::wrap).next())
            .map(|el| text_content(&el))
            .filter(|t| !t.is_empty()),
    }
}

fn collect_texts(html: &str, selector: &Selector) -> Option<Vec<String>> {
    let doc = Html::parse_document(html);
    let texts: Vec<String> = doc
        .select(selector)
        .map(|el| text_content(&el))
        .filter(|t| !t.is_empty())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts)
    }
}

fn text_content(element: &ElementRef<'_>) -> String {
    let raw = element.text().collect::<Vec<_>>().join("");
    remove_non_ascii(&raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn remove_non_ascii(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii() || c.is_whitespace())
        .collect()
}
