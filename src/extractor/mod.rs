pub mod imdb;

use std::fmt;

use async_trait::async_trait;

use crate::error::FetchError;

pub use imdb::ImdbExtractor;

/// Attributes a film can only obtain from its web page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    ReleaseYear,
    MainActors,
    Synopsis,
    PlotKeywords,
    FilmingLocations,
    OriginCountry,
    PrimaryLanguages,
}

impl AttributeKind {
    /// Attributes every enrichment fetches, in fetch order.
    /// `ReleaseYear` is only fetched when the seed did not provide it.
    pub const ENRICHED: [AttributeKind; 6] = [
        AttributeKind::MainActors,
        AttributeKind::Synopsis,
        AttributeKind::PlotKeywords,
        AttributeKind::FilmingLocations,
        AttributeKind::OriginCountry,
        AttributeKind::PrimaryLanguages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::ReleaseYear => "releaseYear",
            AttributeKind::MainActors => "mainActors",
            AttributeKind::Synopsis => "synopsis",
            AttributeKind::PlotKeywords => "plotKeywords",
            AttributeKind::FilmingLocations => "filmingLocations",
            AttributeKind::OriginCountry => "originCountry",
            AttributeKind::PrimaryLanguages => "primaryLanguages",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Year(i32),
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn into_text(self) -> Option<String> {
        match self {
            AttributeValue::Text(text) => Some(text),
            AttributeValue::List(items) => Some(items.join(", ")),
            AttributeValue::Year(_) => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            AttributeValue::List(items) => Some(items),
            AttributeValue::Text(text) => Some(vec![text]),
            AttributeValue::Year(_) => None,
        }
    }
}

/// Source of the attributes missing from the seed data.
///
/// `Ok(None)` means the page was fetched but the attribute is not on it.
/// Errors must report `FetchError::HostUnreachable` when the host itself is
/// down so callers can tell systemic failures from per-page ones.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        kind: AttributeKind,
    ) -> Result<Option<AttributeValue>, FetchError>;
}
