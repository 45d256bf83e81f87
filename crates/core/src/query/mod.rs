//! Cached, paginated fetching on top of the request client.

use std::future::Future;

use serde::de::DeserializeOwned;

use crate::{
    client::{Endpoint, ListParams},
    error::CatalogResult,
    models::Page,
};

/// Connectivity tracking for deferred fetches.
pub mod connectivity;
/// Cache keys derived from the selection.
pub mod key;
/// Paginated query coordinator.
pub mod paged;
/// Retry and freshness settings.
pub mod policy;

pub use connectivity::Connectivity;
pub use key::QueryKey;
pub use paged::{PagedQuery, QuerySnapshot};
pub use policy::{Backoff, FetchPolicy};

/// Anything that can serve one page of a list resource.
pub trait PageSource: Send + Sync + 'static {
    /// Item type of the listed resource.
    type Item: Clone + Send + Sync + 'static;

    /// Fetch the page described by `params`.
    fn fetch(
        &self,
        params: &ListParams,
    ) -> impl Future<Output = CatalogResult<Page<Self::Item>>> + Send;
}

impl<T> PageSource for Endpoint<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Item = T;

    fn fetch(&self, params: &ListParams) -> impl Future<Output = CatalogResult<Page<T>>> + Send {
        self.list(params)
    }
}
