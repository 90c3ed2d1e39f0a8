//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::search::normalize;

/// A country as returned by the geography API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    /// ISO 3166-1 alpha-2 code (e.g. "ZA")
    pub iso_alpha2: String,
    /// ISO 3166-1 alpha-3 code (e.g. "ZAF")
    pub iso_alpha3: String,
}

impl Country {
    pub fn new(name: impl Into<String>, iso_alpha2: impl Into<String>, iso_alpha3: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            iso_alpha2: iso_alpha2.into(),
            iso_alpha3: iso_alpha3.into(),
        }
    }
}

/// Where the resolver currently is in the drill-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Country,
    Province,
    City,
    /// Terminal: a city was chosen.
    Selected,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Country => write!(f, "country"),
            Self::Province => write!(f, "province"),
            Self::City => write!(f, "city"),
            Self::Selected => write!(f, "selected"),
        }
    }
}

/// The final result of a resolver session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub city: String,
    pub country: String,
    pub province: String,
}

/// Options a caller opens a session with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// City the action already belongs to; never offered as a choice.
    pub origin_city: Option<String>,
    /// Auto-select this country once the country list resolves.
    pub initial_country: Option<String>,
    /// Auto-select this province once the province list resolves.
    pub initial_province: Option<String>,
}

/// Identifies one cached lookup. Components are normalized, so lookups that
/// differ only by case or surrounding whitespace share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn countries() -> Self {
        Self("countries".to_string())
    }

    pub fn provinces(country: &str) -> Self {
        Self(format!("provinces:{}", normalize(country)))
    }

    pub fn cities(country: &str, province: &str) -> Self {
        Self(format!("cities:{}::{}", normalize(country), normalize(province)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved list held by the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CachedList {
    Countries(Vec<Country>),
    Names(Vec<String>),
}

impl CachedList {
    pub fn len(&self) -> usize {
        match self {
            Self::Countries(c) => c.len(),
            Self::Names(n) => n.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Location resolution errors.
///
/// `Clone` so a single fetch outcome can be handed to every caller waiting
/// on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Request timed out")]
    Timeout,
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
    #[error("'{name}' is not a valid {step} choice")]
    UnknownChoice { step: Step, name: String },
    #[error("Cannot make a {step} choice in the current state")]
    InvalidTransition { step: Step },
}

impl LocationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
