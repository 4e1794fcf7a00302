// ABOUTME: ProductRecord struct holding extracted product data from a fetched page.
// ABOUTME: Includes the ExtractionMethod tag and usability helpers consumed by the orchestrator.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Which path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    #[default]
    Light,
    Heavy,
    Cache,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionMethod::Light => "light",
            ExtractionMethod::Heavy => "heavy",
            ExtractionMethod::Cache => "cache",
        };
        write!(f, "{}", s)
    }
}

/// Product data extracted from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub price_raw: Option<String>,
    pub currency: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub source_url: String,
    pub extraction_method: ExtractionMethod,
}

impl ProductRecord {
    /// A record is usable only when it carries a non-empty title.
    pub fn is_usable(&self) -> bool {
        self.title.as_ref().map_or(false, |t| !t.trim().is_empty())
    }

    /// Returns true if either a numeric or a raw price is present.
    pub fn has_price(&self) -> bool {
        self.price.is_some() || self.price_raw.as_ref().map_or(false, |p| !p.is_empty())
    }

    /// Returns true if the record has a non-empty image URL.
    pub fn has_image(&self) -> bool {
        self.image.as_ref().map_or(false, |u| !u.is_empty())
    }

    /// Copy of this record re-tagged with a different extraction method.
    pub fn tagged(&self, method: ExtractionMethod) -> Self {
        Self {
            extraction_method: method,
            ..self.clone()
        }
    }
}

/// Truncate a string to at most `max` characters without splitting a char.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
