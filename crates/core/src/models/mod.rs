//! Shared domain models mirrored from the remote catalog API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod filters;

pub use filters::{filter_genres, heading, SortOrder};

/// A parent platform (PC, PlayStation, Xbox, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Catalog identifier, used as the `platforms` filter value.
    pub id: u64,
    /// Human-readable platform name.
    pub name: String,
    /// URL-safe identifier.
    pub slug: String,
}

/// A game genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Catalog identifier, used as the `genres` filter value.
    pub id: u64,
    /// Human-readable genre name.
    pub name: String,
    /// Artwork shown behind the genre in pickers.
    #[serde(default)]
    pub image_background: Option<String>,
}

/// Wrapper the API uses inside `parent_platforms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentPlatform {
    /// The wrapped platform.
    pub platform: Platform,
}

/// A game as returned by list and detail endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Catalog identifier.
    pub id: u64,
    /// Display title.
    pub name: String,
    /// URL-safe identifier.
    pub slug: String,
    /// Cover artwork.
    #[serde(default)]
    pub background_image: Option<String>,
    /// Release date, absent for unreleased titles.
    #[serde(default)]
    pub released: Option<NaiveDate>,
    /// Parent platforms in API order.
    #[serde(default)]
    pub parent_platforms: Vec<ParentPlatform>,
    /// Metacritic score, when rated.
    #[serde(default)]
    pub metacritic: Option<u32>,
    /// Genres in API order.
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl Game {
    /// Names of the parent platforms, preserving API order.
    pub fn platform_names(&self) -> Vec<&str> {
        self.parent_platforms
            .iter()
            .map(|entry| entry.platform.name.as_str())
            .collect()
    }

    /// Release date formatted for display, or `TBA`.
    pub fn release_label(&self) -> String {
        match self.released {
            Some(date) => date.format("%d %b %Y").to_string(),
            None => "TBA".to_string(),
        }
    }
}

/// Paginated envelope wrapping every list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total number of items across all pages.
    pub count: u64,
    /// Cursor for the following page; `None` on the last page.
    #[serde(default)]
    pub next: Option<String>,
    /// Items of this page in server order.
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// True when the server advertised another page.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}
