//! Wiring between the selection store, the request client and the
//! coordinators the presentation layer reads from.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    client::{ApiClient, Endpoint, GAMES_PATH, GENRES_PATH, PLATFORMS_PATH},
    config::AppConfig,
    error::CatalogResult,
    models::{Game, Genre, Platform},
    query::{Connectivity, PageSource, PagedQuery, QueryKey},
    store::SelectionStore,
};

/// Cache-key resource name of the games listing.
pub const GAMES: &str = "games";
/// Cache-key resource name of the genre list.
pub const GENRES: &str = "genres";
/// Cache-key resource name of the platform list.
pub const PLATFORMS: &str = "platforms";

/// Coordinator type for each listed resource.
pub type GamesQuery = PagedQuery<Endpoint<Game>>;
/// Coordinator for the genre list.
pub type GenresQuery = PagedQuery<Endpoint<Genre>>;
/// Coordinator for the parent platform list.
pub type PlatformsQuery = PagedQuery<Endpoint<Platform>>;

/// Everything a screen needs to browse the catalog.
pub struct Catalog {
    store: SelectionStore,
    connectivity: Connectivity,
    games_endpoint: Endpoint<Game>,
    games: Arc<GamesQuery>,
    genres: Arc<GenresQuery>,
    platforms: Arc<PlatformsQuery>,
}

impl Catalog {
    /// Build the client and coordinators from configuration.
    pub fn new(config: &AppConfig, store: SelectionStore, connectivity: Connectivity) -> CatalogResult<Self> {
        let client = ApiClient::new(config)?;
        let games_endpoint = Endpoint::new(client.clone(), GAMES_PATH);
        let games = Arc::new(PagedQuery::new(
            games_endpoint.clone(),
            QueryKey::from_selection(GAMES, &store.snapshot()),
            config.games_policy(),
            connectivity.clone(),
        ));
        let genres = Arc::new(PagedQuery::new(
            Endpoint::new(client.clone(), GENRES_PATH),
            QueryKey::resource(GENRES),
            config.reference_policy(),
            connectivity.clone(),
        ));
        let platforms = Arc::new(PagedQuery::new(
            Endpoint::new(client, PLATFORMS_PATH),
            QueryKey::resource(PLATFORMS),
            config.reference_policy(),
            connectivity.clone(),
        ));
        info!(base_url = %config.base_url, "catalog ready");

        Ok(Self {
            store,
            connectivity,
            games_endpoint,
            games,
            genres,
            platforms,
        })
    }

    /// The shared selection store.
    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    /// The shared connectivity flag.
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Paginated games listing.
    pub fn games(&self) -> &Arc<GamesQuery> {
        &self.games
    }

    /// Genre reference list.
    pub fn genres(&self) -> &Arc<GenresQuery> {
        &self.genres
    }

    /// Parent platform reference list.
    pub fn platforms(&self) -> &Arc<PlatformsQuery> {
        &self.platforms
    }

    /// Point the games listing at the key of the current selection.
    pub fn sync_games(&self) -> bool {
        sync_key(&self.store, &self.games, GAMES)
    }

    /// Keep the games listing following the selection store in the background.
    pub fn watch_selection(&self) -> JoinHandle<()> {
        follow_selection(self.store.clone(), Arc::clone(&self.games), GAMES)
    }

    /// Fetch one game by id.
    pub async fn game(&self, id: u64) -> CatalogResult<Game> {
        self.games_endpoint.get(id).await
    }
}

fn sync_key<S: PageSource>(store: &SelectionStore, query: &PagedQuery<S>, resource: &'static str) -> bool {
    query.select(QueryKey::from_selection(resource, &store.snapshot()))
}

/// Spawn a task that re-keys `query` on every effective selection change and
/// loads the new key. Ends when every store handle is dropped.
pub fn follow_selection<S: PageSource>(
    store: SelectionStore,
    query: Arc<PagedQuery<S>>,
    resource: &'static str,
) -> JoinHandle<()> {
    let mut changes = store.subscribe();
    drop(store);
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let key = QueryKey::from_selection(resource, &changes.borrow_and_update());
            if query.select(key) {
                let query = Arc::clone(&query);
                tokio::spawn(async move {
                    query.ensure().await;
                });
            } else {
                debug!("selection changed without affecting the query key");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::ListParams,
        error::CatalogError,
        models::Page,
        query::{Backoff, FetchPolicy},
    };
    use std::{future::Future, time::Duration};

    #[derive(Default)]
    struct CountingSource {
        calls: parking_lot::Mutex<Vec<ListParams>>,
    }

    impl PageSource for Arc<CountingSource> {
        type Item = u64;

        fn fetch(
            &self,
            params: &ListParams,
        ) -> impl Future<Output = Result<Page<u64>, CatalogError>> + Send {
            self.calls.lock().push(params.clone());
            let genre = params.genres.unwrap_or(0);
            async move {
                Ok(Page {
                    count: 1,
                    next: None,
                    results: vec![genre],
                })
            }
        }
    }

    fn genre(id: u64) -> Genre {
        Genre {
            id,
            name: format!("genre {id}"),
            image_background: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn following_the_store_rekeys_and_loads() {
        let store = SelectionStore::new();
        let source = Arc::new(CountingSource::default());
        let query = Arc::new(PagedQuery::new(
            Arc::clone(&source),
            QueryKey::resource(GAMES),
            FetchPolicy::listing().with_backoff(Backoff::NONE),
            Connectivity::default(),
        ));
        let handle = follow_selection(store.clone(), Arc::clone(&query), GAMES);

        store.set_selected_genre(Some(genre(4)));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(query.key().genre, Some(4));
        assert_eq!(query.snapshot().items, vec![4]);

        // Repeating the selection and toggling the modal leave the key alone.
        store.set_selected_genre(Some(genre(4)));
        store.set_is_modal_visible(true);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(source.calls.lock().len(), 1);

        drop(store);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop once the store is gone")
            .expect("watcher should not panic");
    }

    #[test]
    fn sync_key_derives_from_snapshot() {
        let store = SelectionStore::new();
        let query = PagedQuery::new(
            Arc::new(CountingSource::default()),
            QueryKey::resource(GAMES),
            FetchPolicy::listing(),
            Connectivity::default(),
        );
        assert!(!sync_key(&store, &query, GAMES));
        store.set_search_text(Some("zelda".to_string()));
        assert!(sync_key(&store, &query, GAMES));
        assert_eq!(query.key().search, "zelda");
    }

    #[tokio::test]
    async fn catalog_starts_on_the_current_selection() {
        let store = SelectionStore::new();
        store.set_sort_order(Some("-rating".to_string()));
        let catalog = Catalog::new(&AppConfig::default(), store, Connectivity::default())
            .expect("catalog should build");

        assert_eq!(catalog.games().key().ordering, "-rating");
        assert_eq!(catalog.genres().key(), QueryKey::resource(GENRES));
        assert_eq!(
            catalog.platforms().policy().stale_time,
            Duration::from_secs(86_400)
        );
        assert!(!catalog.sync_games());
        catalog.store().set_search_text(Some("portal".to_string()));
        assert!(catalog.sync_games());
        assert_eq!(catalog.games().key().search, "portal");
    }
}
