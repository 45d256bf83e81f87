#![warn(clippy::all, missing_docs)]

//! Core data layer for the gamehub catalog browser.
//!
//! This crate hosts the catalog models, the typed request client, the
//! filter selection store and the paginated fetch coordinator used by the
//! terminal UI and any future frontends.

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod store;

pub use catalog::Catalog;
pub use client::{ApiClient, Endpoint, ListParams};
pub use config::AppConfig;
pub use error::{CatalogError, CatalogResult};
pub use models::{Game, Genre, Page, Platform, SortOrder};
pub use query::{Connectivity, FetchPolicy, PagedQuery, QueryKey, QuerySnapshot};
pub use store::{Selection, SelectionStore};
