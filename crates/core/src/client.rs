//! Typed HTTP client for the remote game catalog.

use std::{fmt::Display, marker::PhantomData, time::Duration};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    config::AppConfig,
    error::{CatalogError, CatalogResult},
    models::Page,
};

/// Path of the games list resource.
pub const GAMES_PATH: &str = "/games";
/// Path of the genres list resource.
pub const GENRES_PATH: &str = "/genres";
/// Path of the parent platforms list resource.
pub const PLATFORMS_PATH: &str = "/platforms/lists/parents";

/// Recognised list filters. `None` fields are left out of the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Genre id.
    pub genres: Option<u64>,
    /// Parent platform id.
    pub platforms: Option<u64>,
    /// Free-text search.
    pub search: Option<String>,
    /// Sort key.
    pub ordering: Option<String>,
    /// 1-indexed page number.
    pub page: Option<u32>,
}

impl ListParams {
    /// Same filters targeting `page`.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Query pairs in a stable order, skipping absent and blank values.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(genres) = self.genres {
            query.push(("genres", genres.to_string()));
        }
        if let Some(platforms) = self.platforms {
            query.push(("platforms", platforms.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            query.push(("search", search.to_string()));
        }
        if let Some(ordering) = self.ordering.as_deref().filter(|s| !s.is_empty()) {
            query.push(("ordering", ordering.to_string()));
        }
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }
        query
    }
}

/// Shared HTTP client bound to one catalog host and API key.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: Option<u32>,
}

impl ApiClient {
    /// Build a client from configuration.
    pub fn new(config: &AppConfig) -> CatalogResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
        })
    }

    /// Base address requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a paginated list resource.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &ListParams,
    ) -> CatalogResult<Page<T>> {
        let mut query = params.to_query();
        if let Some(page_size) = self.page_size {
            query.push(("page_size", page_size.to_string()));
        }
        let url = self.url(path);
        debug!(%url, ?query, "listing catalog resource");
        self.get_json(&url, &query, false).await
    }

    /// GET a single resource by identifier.
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        path: &str,
        id: impl Display,
    ) -> CatalogResult<T> {
        let url = format!("{}/{}", self.url(path), id);
        debug!(%url, "fetching catalog item");
        self.get_json(&url, &[], true).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
        single: bool,
    ) -> CatalogResult<T> {
        let response = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        map_status(response.status(), single)?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Translate a response status into the error taxonomy.
///
/// 404 maps to [`CatalogError::NotFound`] only for single-item lookups.
pub fn map_status(status: StatusCode, single: bool) -> CatalogResult<()> {
    if status.is_success() {
        return Ok(());
    }
    if single && status == StatusCode::NOT_FOUND {
        return Err(CatalogError::NotFound);
    }
    Err(CatalogError::Http {
        status: status.as_u16(),
    })
}

/// A list resource of one item type, the way screens consume it.
pub struct Endpoint<T> {
    client: ApiClient,
    path: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            path: self.path,
            _item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Endpoint<T> {
    /// Bind `client` to the resource at `path`.
    pub fn new(client: ApiClient, path: &'static str) -> Self {
        Self {
            client,
            path,
            _item: PhantomData,
        }
    }

    /// Resource path relative to the base address.
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// List one page of the resource.
    pub async fn list(&self, params: &ListParams) -> CatalogResult<Page<T>> {
        self.client.list_all(self.path, params).await
    }

    /// Fetch one item of the resource.
    pub async fn get(&self, id: impl Display) -> CatalogResult<T> {
        self.client.get_one(self.path, id).await
    }
}
