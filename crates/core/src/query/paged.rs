use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Connectivity, FetchPolicy, PageSource, QueryKey};
use crate::{
    client::ListParams,
    error::{CatalogError, CatalogResult},
    models::Page,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    /// Page 1 of a key with no data.
    Initial,
    /// The page after the last accumulated one.
    NextPage,
    /// Pages 1..K again, swapped in once all have arrived.
    Revalidate,
}

/// Identifies one fetch so its completion can be matched to the entry it
/// was started for.
#[derive(Debug, Clone)]
struct Ticket {
    key: QueryKey,
    epoch: u64,
    kind: FetchKind,
}

struct Entry<T> {
    pages: Vec<Page<T>>,
    fetched_at: Option<Instant>,
    in_flight: Option<FetchKind>,
    deferred: bool,
    error: Option<CatalogError>,
    errored_at: Option<Instant>,
    /// Set while the key is not the active one.
    inactive_since: Option<Instant>,
    /// Bumped whenever accumulated pages are discarded.
    epoch: u64,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            fetched_at: None,
            in_flight: None,
            deferred: false,
            error: None,
            errored_at: None,
            inactive_since: None,
            epoch: 0,
        }
    }
}

impl<T> Entry<T> {
    fn has_next_page(&self) -> bool {
        self.pages.last().map(Page::has_next).unwrap_or(false)
    }

    fn is_stale(&self, policy: &FetchPolicy) -> bool {
        self.fetched_at
            .map(|at| at.elapsed() >= policy.stale_time)
            .unwrap_or(true)
    }

    /// Stale, idle, and not inside the cool-down that follows a failure.
    fn wants_background_fetch(&self, policy: &FetchPolicy) -> bool {
        let cooled_down = self
            .errored_at
            .map(|at| at.elapsed() >= policy.stale_time)
            .unwrap_or(true);
        self.in_flight.is_none() && !self.deferred && cooled_down && self.is_stale(policy)
    }

    fn is_evictable(&self, policy: &FetchPolicy) -> bool {
        self.in_flight.is_none()
            && self
                .inactive_since
                .map(|at| at.elapsed() >= policy.cache_time)
                .unwrap_or(false)
    }
}

struct State<T> {
    active: QueryKey,
    entries: HashMap<QueryKey, Entry<T>>,
}

/// Point-in-time view of the active query, as the presentation layer sees it.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    /// Key the snapshot belongs to.
    pub key: QueryKey,
    /// Items of pages 1..K, concatenated in page order.
    pub items: Vec<T>,
    /// Server-reported total from the last page, if any page arrived.
    pub total: Option<u64>,
    /// Number of accumulated pages.
    pub pages: usize,
    /// Whether the last accumulated page advertised a successor.
    pub has_next_page: bool,
    /// First page of a key without data is in flight.
    pub is_loading: bool,
    /// A page beyond the first is in flight.
    pub is_fetching_next_page: bool,
    /// Accumulated pages are being refetched in the background.
    pub is_revalidating: bool,
    /// A fetch is waiting for connectivity.
    pub is_deferred: bool,
    /// Data is older than the freshness window (or absent).
    pub is_stale: bool,
    /// Last failure, cleared by the next successful fetch.
    pub error: Option<CatalogError>,
}

impl<T> QuerySnapshot<T> {
    /// Any fetch is running or waiting for this key.
    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_fetching_next_page || self.is_revalidating || self.is_deferred
    }
}

/// Paginated fetch coordinator for one list resource.
///
/// Holds one cache entry per [`QueryKey`] and a single active key. Within a
/// key at most one fetch runs at a time, so accumulated pages are always the
/// gap-free prefix 1..K. Completions carry the key and epoch they were
/// started for; anything that no longer matches is dropped.
pub struct PagedQuery<S: PageSource> {
    source: S,
    policy: FetchPolicy,
    connectivity: Connectivity,
    state: Mutex<State<S::Item>>,
}

impl<S: PageSource> PagedQuery<S> {
    /// Create a coordinator starting on `key`.
    pub fn new(source: S, key: QueryKey, policy: FetchPolicy, connectivity: Connectivity) -> Self {
        Self {
            source,
            policy,
            connectivity,
            state: Mutex::new(State {
                active: key,
                entries: HashMap::new(),
            }),
        }
    }

    /// The active key.
    pub fn key(&self) -> QueryKey {
        self.state.lock().active.clone()
    }

    /// Retry and freshness settings in use.
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Make `key` the active query. Returns whether it differed.
    ///
    /// Fetches still running for the previous key finish into that key's
    /// entry and never touch the new one. Keys left inactive for longer than
    /// the policy's cache time are evicted here.
    pub fn select(&self, key: QueryKey) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.active == key {
            return false;
        }
        info!(from = %state.active, to = %key, "switching query key");

        let now = Instant::now();
        if let Some(previous) = state.entries.get_mut(&state.active) {
            previous.inactive_since = Some(now);
        }
        let policy = &self.policy;
        state.entries.retain(|cached, entry| {
            let evict = entry.is_evictable(policy);
            if evict {
                debug!(key = %cached, "evicting inactive query");
            }
            !evict
        });
        if let Some(next) = state.entries.get_mut(&key) {
            next.inactive_since = None;
        }
        state.active = key;
        true
    }

    /// Current view of the active key.
    pub fn snapshot(&self) -> QuerySnapshot<S::Item> {
        let state = self.state.lock();
        let entry = state.entries.get(&state.active);
        let in_flight = entry.and_then(|entry| entry.in_flight);
        QuerySnapshot {
            key: state.active.clone(),
            items: entry
                .map(|entry| {
                    entry
                        .pages
                        .iter()
                        .flat_map(|page| page.results.iter().cloned())
                        .collect()
                })
                .unwrap_or_default(),
            total: entry.and_then(|entry| entry.pages.last()).map(|page| page.count),
            pages: entry.map(|entry| entry.pages.len()).unwrap_or(0),
            has_next_page: entry.map(Entry::has_next_page).unwrap_or(false),
            is_loading: in_flight == Some(FetchKind::Initial),
            is_fetching_next_page: in_flight == Some(FetchKind::NextPage),
            is_revalidating: in_flight == Some(FetchKind::Revalidate),
            is_deferred: entry.map(|entry| entry.deferred).unwrap_or(false),
            is_stale: entry.map(|entry| entry.is_stale(&self.policy)).unwrap_or(true),
            error: entry.and_then(|entry| entry.error.clone()),
        }
    }

    /// Whether the active key has another page to load.
    pub fn has_next_page(&self) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(&state.active)
            .map(Entry::has_next_page)
            .unwrap_or(false)
    }

    /// Fetch page `page` of the active key with the retry policy applied.
    ///
    /// The result is returned as-is and not merged into the cache.
    pub async fn fetch_page(&self, page: u32) -> CatalogResult<Page<S::Item>> {
        let params = self.key().params(page);
        self.fetch_with_retry(&params, None).await
    }

    /// Load page 1 when the active key has no data, or revalidate it when
    /// stale. Fresh data and fetches already in flight are left alone.
    pub async fn ensure(&self) -> QuerySnapshot<S::Item> {
        let kind = {
            let state = self.state.lock();
            match state.entries.get(&state.active) {
                Some(entry) if entry.in_flight.is_some() => None,
                Some(entry) if !entry.pages.is_empty() => entry
                    .is_stale(&self.policy)
                    .then_some(FetchKind::Revalidate),
                _ => Some(FetchKind::Initial),
            }
        };
        if let Some(kind) = kind {
            self.run(kind).await;
        }
        self.snapshot()
    }

    /// Append the next page. No-op while a fetch for this key is in flight or
    /// when the last page had no successor.
    pub async fn load_more(&self) -> QuerySnapshot<S::Item> {
        self.run(FetchKind::NextPage).await;
        self.snapshot()
    }

    /// Drop accumulated pages for the active key and fetch page 1 again.
    pub async fn refresh(&self) -> QuerySnapshot<S::Item> {
        {
            let mut state = self.state.lock();
            let key = state.active.clone();
            let entry = state.entries.entry(key.clone()).or_default();
            entry.epoch += 1;
            entry.pages.clear();
            entry.fetched_at = None;
            entry.in_flight = None;
            entry.deferred = false;
            entry.error = None;
            entry.errored_at = None;
            debug!(%key, epoch = entry.epoch, "discarded accumulated pages");
        }
        self.run(FetchKind::Initial).await;
        self.snapshot()
    }

    /// Refetch pages 1..K of the active key, keeping the current pages
    /// visible until the replacement set is complete.
    pub async fn revalidate(&self) -> QuerySnapshot<S::Item> {
        self.run(FetchKind::Revalidate).await;
        self.snapshot()
    }

    /// Return the current view immediately. Stale or missing data with no
    /// fetch running schedules a background [`ensure`](Self::ensure). After a
    /// failure the next background attempt waits one stale window.
    pub fn read(self: &Arc<Self>) -> QuerySnapshot<S::Item> {
        let snapshot = self.snapshot();
        let wanted = {
            let state = self.state.lock();
            state
                .entries
                .get(&state.active)
                .map(|entry| entry.wants_background_fetch(&self.policy))
                .unwrap_or(true)
        };
        if wanted {
            let query = Arc::clone(self);
            tokio::spawn(async move {
                query.ensure().await;
            });
        }
        snapshot
    }

    async fn run(&self, kind: FetchKind) {
        let Some((ticket, page)) = self.begin(kind) else {
            return;
        };
        let outcome = match ticket.kind {
            FetchKind::Initial | FetchKind::NextPage => self
                .fetch_with_retry(&ticket.key.params(page), Some(&ticket))
                .await
                .map(|page| vec![page]),
            FetchKind::Revalidate => self.refetch_pages(&ticket, page).await,
        };
        self.finish(ticket, outcome);
    }

    /// Claim the active key's fetch slot. Returns the ticket plus the page to
    /// fetch (for revalidation, the number of pages to refetch).
    fn begin(&self, kind: FetchKind) -> Option<(Ticket, u32)> {
        let mut state = self.state.lock();
        let key = state.active.clone();
        let entry = state.entries.entry(key.clone()).or_default();
        if entry.in_flight.is_some() {
            debug!(%key, ?kind, "fetch already in flight");
            return None;
        }

        let (kind, page) = match kind {
            FetchKind::Initial => (FetchKind::Initial, 1),
            FetchKind::NextPage => {
                if !entry.has_next_page() {
                    return None;
                }
                (FetchKind::NextPage, entry.pages.len() as u32 + 1)
            }
            FetchKind::Revalidate if entry.pages.is_empty() => (FetchKind::Initial, 1),
            FetchKind::Revalidate => (FetchKind::Revalidate, entry.pages.len() as u32),
        };

        entry.in_flight = Some(kind);
        debug!(%key, ?kind, page, "starting fetch");
        Some((
            Ticket {
                key,
                epoch: entry.epoch,
                kind,
            },
            page,
        ))
    }

    async fn refetch_pages(&self, ticket: &Ticket, count: u32) -> CatalogResult<Vec<Page<S::Item>>> {
        let mut pages = Vec::with_capacity(count as usize);
        for number in 1..=count {
            let page = self
                .fetch_with_retry(&ticket.key.params(number), Some(ticket))
                .await?;
            let more = page.has_next();
            pages.push(page);
            if !more {
                break;
            }
        }
        Ok(pages)
    }

    async fn fetch_with_retry(
        &self,
        params: &ListParams,
        ticket: Option<&Ticket>,
    ) -> CatalogResult<Page<S::Item>> {
        let mut attempt = 0;
        loop {
            if !self.connectivity.is_online() {
                warn!(page = ?params.page, "offline, deferring fetch until connectivity returns");
                self.mark_deferred(ticket, true);
                self.connectivity.wait_online().await;
                self.mark_deferred(ticket, false);
            }

            match self.source.fetch(params).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && attempt < self.policy.retries => {
                    let delay = self.policy.backoff.delay(attempt);
                    attempt += 1;
                    warn!(
                        %err,
                        attempt,
                        retries = self.policy.retries,
                        ?delay,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn mark_deferred(&self, ticket: Option<&Ticket>, deferred: bool) {
        let Some(ticket) = ticket else {
            return;
        };
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(&ticket.key) {
            if entry.epoch == ticket.epoch {
                entry.deferred = deferred;
            }
        }
    }

    fn finish(&self, ticket: Ticket, outcome: CatalogResult<Vec<Page<S::Item>>>) {
        let mut state = self.state.lock();
        let active = state.active == ticket.key;
        let Some(entry) = state.entries.get_mut(&ticket.key) else {
            return;
        };
        if entry.epoch != ticket.epoch {
            warn!(key = %ticket.key, kind = ?ticket.kind, "discarding response for superseded fetch");
            return;
        }

        entry.in_flight = None;
        entry.deferred = false;
        match outcome {
            Ok(pages) => {
                match ticket.kind {
                    FetchKind::NextPage => entry.pages.extend(pages),
                    FetchKind::Initial | FetchKind::Revalidate => entry.pages = pages,
                }
                entry.fetched_at = Some(Instant::now());
                entry.error = None;
                entry.errored_at = None;
                debug!(
                    key = %ticket.key,
                    kind = ?ticket.kind,
                    pages = entry.pages.len(),
                    active,
                    "fetch completed"
                );
            }
            Err(err) => {
                warn!(key = %ticket.key, kind = ?ticket.kind, %err, "fetch failed");
                entry.error = Some(err);
                entry.errored_at = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Backoff;
    use std::{
        collections::{HashMap, VecDeque},
        future::Future,
        time::Duration,
    };

    type Item = u32;

    /// Deterministic in-memory catalog. Pages are keyed by genre id and page
    /// number; queued failures are served before any page.
    #[derive(Default)]
    struct MockServer {
        pages: HashMap<(Option<u64>, u32), Page<Item>>,
        delays: HashMap<(Option<u64>, u32), Duration>,
        failures: parking_lot::Mutex<VecDeque<CatalogError>>,
        calls: parking_lot::Mutex<Vec<ListParams>>,
    }

    impl MockServer {
        /// `page_count` pages of `per_page` items for `genre`; items are
        /// numbered from `first` upwards.
        fn with_catalog(mut self, genre: Option<u64>, first: Item, per_page: u32, page_count: u32) -> Self {
            let total = u64::from(per_page * page_count);
            for number in 1..=page_count {
                let start = first + (number - 1) * per_page;
                self.pages.insert(
                    (genre, number),
                    Page {
                        count: total,
                        next: (number < page_count).then(|| format!("page{}", number + 1)),
                        results: (start..start + per_page).collect(),
                    },
                );
            }
            self
        }

        fn with_delay(mut self, genre: Option<u64>, page: u32, delay: Duration) -> Self {
            self.delays.insert((genre, page), delay);
            self
        }

        fn fail_next(&self, errors: impl IntoIterator<Item = CatalogError>) {
            self.failures.lock().extend(errors);
        }

        fn calls(&self) -> Vec<(Option<u64>, u32)> {
            self.calls
                .lock()
                .iter()
                .map(|params| (params.genres, params.page.unwrap_or(0)))
                .collect()
        }
    }

    impl PageSource for Arc<MockServer> {
        type Item = Item;

        fn fetch(
            &self,
            params: &ListParams,
        ) -> impl Future<Output = CatalogResult<Page<Item>>> + Send {
            let server = Arc::clone(self);
            let params = params.clone();
            async move {
                server.calls.lock().push(params.clone());
                let slot = (params.genres, params.page.unwrap_or(1));
                if let Some(delay) = server.delays.get(&slot) {
                    tokio::time::sleep(*delay).await;
                }
                if let Some(err) = server.failures.lock().pop_front() {
                    return Err(err);
                }
                server
                    .pages
                    .get(&slot)
                    .cloned()
                    .ok_or(CatalogError::Http { status: 404 })
            }
        }
    }

    fn games_key(genre: Option<u64>) -> QueryKey {
        QueryKey {
            genre,
            ..QueryKey::resource("games")
        }
    }

    fn policy() -> FetchPolicy {
        FetchPolicy::listing().with_backoff(Backoff::NONE)
    }

    fn query(server: &Arc<MockServer>, policy: FetchPolicy) -> Arc<PagedQuery<Arc<MockServer>>> {
        Arc::new(PagedQuery::new(
            Arc::clone(server),
            games_key(None),
            policy,
            Connectivity::default(),
        ))
    }

    #[tokio::test]
    async fn two_page_scenario_accumulates_in_order() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 20, 2));
        let query = query(&server, policy());

        let first = query.ensure().await;
        assert_eq!(first.items, (1..=20).collect::<Vec<Item>>());
        assert_eq!(first.total, Some(40));
        assert!(first.has_next_page);
        assert!(!first.is_loading);

        let second = query.load_more().await;
        assert_eq!(second.items, (1..=40).collect::<Vec<Item>>());
        assert!(!second.has_next_page);
        assert!(!second.is_fetching_next_page);
        assert!(second.error.is_none());
        assert_eq!(server.calls(), vec![(None, 1), (None, 2)]);
    }

    #[tokio::test]
    async fn load_more_is_a_no_op_after_last_page() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 5, 4));
        let query = query(&server, policy());

        query.ensure().await;
        for _ in 0..3 {
            query.load_more().await;
        }
        let snapshot = query.snapshot();
        assert_eq!(snapshot.items, (1..=20).collect::<Vec<Item>>());
        assert_eq!(snapshot.pages, 4);
        assert!(!query.has_next_page());

        query.load_more().await;
        query.load_more().await;
        assert_eq!(
            server.calls(),
            vec![(None, 1), (None, 2), (None, 3), (None, 4)]
        );
    }

    #[tokio::test]
    async fn load_more_without_data_does_nothing() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 5, 2));
        let query = query(&server, policy());

        let snapshot = query.load_more().await;
        assert!(snapshot.items.is_empty());
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 20, 1));
        server.fail_next([
            CatalogError::Http { status: 500 },
            CatalogError::Http { status: 500 },
        ]);
        let query = query(&server, policy());

        let snapshot = query.ensure().await;
        assert_eq!(snapshot.items.len(), 20);
        assert!(snapshot.error.is_none());
        assert_eq!(server.calls().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 20, 1));
        server.fail_next(std::iter::repeat(CatalogError::Network("refused".into())).take(3));
        let query = query(&server, policy());

        let snapshot = query.ensure().await;
        assert!(snapshot.items.is_empty());
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.error, Some(CatalogError::Network("refused".into())));
        assert_eq!(server.calls().len(), 3);

        // The next successful fetch clears the error.
        let snapshot = query.ensure().await;
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.items.len(), 20);
    }

    #[tokio::test]
    async fn zero_retries_fail_on_first_error() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 20, 1));
        server.fail_next([CatalogError::Http { status: 502 }]);
        let query = query(&server, policy().with_retries(0));

        let snapshot = query.ensure().await;
        assert_eq!(snapshot.error, Some(CatalogError::Http { status: 502 }));
        assert_eq!(server.calls().len(), 1);
    }

    #[tokio::test]
    async fn parse_errors_are_not_retried() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 20, 1));
        server.fail_next([CatalogError::Parse("missing field `results`".into())]);
        let query = query(&server, policy());

        let snapshot = query.ensure().await;
        assert!(matches!(snapshot.error, Some(CatalogError::Parse(_))));
        assert_eq!(server.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_next_page_keeps_earlier_pages() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 3));
        let query = query(&server, policy());
        query.ensure().await;

        server.fail_next(std::iter::repeat(CatalogError::Http { status: 503 }).take(3));
        let snapshot = query.load_more().await;
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert_eq!(snapshot.error, Some(CatalogError::Http { status: 503 }));
        assert!(snapshot.has_next_page);

        let snapshot = query.load_more().await;
        assert_eq!(snapshot.items, (1..=20).collect::<Vec<Item>>());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn refresh_discards_pages_and_starts_over() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 3));
        let query = query(&server, policy());
        query.ensure().await;
        query.load_more().await;
        assert_eq!(query.snapshot().pages, 2);

        let snapshot = query.refresh().await;
        assert_eq!(snapshot.pages, 1);
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert_eq!(server.calls(), vec![(None, 1), (None, 2), (None, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_is_not_applied_to_new_key() {
        let server = Arc::new(
            MockServer::default()
                .with_catalog(None, 1, 10, 2)
                .with_catalog(Some(4), 100, 10, 2)
                .with_delay(None, 1, Duration::from_millis(200)),
        );
        let query = query(&server, policy());

        let slow = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.ensure().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(query.snapshot().is_loading);

        assert!(query.select(games_key(Some(4))));
        let snapshot = query.ensure().await;
        assert_eq!(snapshot.items, (100..110).collect::<Vec<Item>>());

        slow.await.expect("slow fetch should not panic");
        let snapshot = query.snapshot();
        assert_eq!(snapshot.key, games_key(Some(4)));
        assert_eq!(snapshot.items, (100..110).collect::<Vec<Item>>());

        // The abandoned response landed in its own key's entry.
        query.select(games_key(None));
        let snapshot = query.ensure().await;
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert_eq!(server.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_next_page_is_dropped_after_refresh() {
        let server = Arc::new(
            MockServer::default()
                .with_catalog(None, 1, 10, 3)
                .with_delay(None, 2, Duration::from_millis(200)),
        );
        let query = query(&server, policy());
        query.ensure().await;

        let pending = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.load_more().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(query.snapshot().is_fetching_next_page);

        let refreshed = query.refresh().await;
        assert_eq!(refreshed.pages, 1);

        pending.await.expect("pending fetch should not panic");
        let snapshot = query.snapshot();
        assert_eq!(snapshot.pages, 1);
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert!(snapshot.has_next_page);
        assert!(!snapshot.is_fetching_next_page);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_load_more_requests_one_page() {
        let server = Arc::new(
            MockServer::default()
                .with_catalog(None, 1, 10, 3)
                .with_delay(None, 2, Duration::from_millis(50)),
        );
        let query = query(&server, policy());
        query.ensure().await;

        let (a, b) = tokio::join!(query.load_more(), query.load_more());
        assert_eq!(a.items.len().max(b.items.len()), 20);
        assert_eq!(query.snapshot().items, (1..=20).collect::<Vec<Item>>());
        assert_eq!(server.calls(), vec![(None, 1), (None, 2)]);
    }

    #[tokio::test]
    async fn keys_are_cached_independently() {
        let server = Arc::new(
            MockServer::default()
                .with_catalog(None, 1, 10, 1)
                .with_catalog(Some(4), 100, 10, 1),
        );
        let query = query(&server, policy());
        query.ensure().await;

        assert!(query.select(games_key(Some(4))));
        assert!(!query.select(games_key(Some(4))));
        assert!(query.snapshot().items.is_empty());
        query.ensure().await;

        query.select(games_key(None));
        let snapshot = query.ensure().await;
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert!(!snapshot.is_stale);
        assert_eq!(server.calls(), vec![(None, 1), (Some(4), 1)]);
    }

    #[tokio::test]
    async fn stale_data_is_revalidated_page_by_page() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 3));
        let query = query(&server, policy().with_stale_time(Duration::ZERO));
        query.ensure().await;
        query.load_more().await;

        let snapshot = query.ensure().await;
        assert_eq!(snapshot.pages, 2);
        assert_eq!(snapshot.items, (1..=20).collect::<Vec<Item>>());
        assert_eq!(
            server.calls(),
            vec![(None, 1), (None, 2), (None, 1), (None, 2)]
        );
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_previous_pages() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 2));
        let query = query(&server, policy().with_retries(0));
        query.ensure().await;

        server.fail_next([CatalogError::Http { status: 500 }]);
        let snapshot = query.revalidate().await;
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert_eq!(snapshot.error, Some(CatalogError::Http { status: 500 }));
    }

    #[tokio::test]
    async fn fresh_data_is_not_refetched() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 1));
        let query = query(&server, policy());
        query.ensure().await;
        query.ensure().await;
        assert_eq!(server.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_serves_cached_data_and_revalidates_in_background() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 1));
        let query = query(&server, policy().with_stale_time(Duration::from_secs(60)));
        query.ensure().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        let snapshot = query.read();
        assert!(snapshot.is_stale);
        assert_eq!(snapshot.items.len(), 10);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(server.calls().len(), 2);
        assert!(!query.snapshot().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_page_delays_but_does_not_block_background_revalidation() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 3));
        let query = query(
            &server,
            policy().with_retries(0).with_stale_time(Duration::from_secs(60)),
        );
        query.ensure().await;

        tokio::time::advance(Duration::from_secs(50)).await;
        server.fail_next([CatalogError::Http { status: 503 }]);
        query.load_more().await;

        // Data is stale but the failure is recent.
        tokio::time::advance(Duration::from_secs(20)).await;
        let snapshot = query.read();
        assert!(snapshot.is_stale);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(server.calls(), vec![(None, 1), (None, 2)]);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let snapshot = query.read();
        assert_eq!(snapshot.error, Some(CatalogError::Http { status: 503 }));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snapshot = query.snapshot();
        assert_eq!(server.calls(), vec![(None, 1), (None, 2), (None, 1)]);
        assert!(snapshot.error.is_none());
        assert!(!snapshot.is_stale);
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());
        assert!(snapshot.has_next_page);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_keys_are_evicted_after_cache_time() {
        let server = Arc::new(
            MockServer::default()
                .with_catalog(None, 1, 10, 1)
                .with_catalog(Some(4), 100, 10, 1),
        );
        let query = query(&server, policy().with_cache_time(Duration::from_secs(300)));
        query.ensure().await;
        query.select(games_key(Some(4)));
        query.ensure().await;

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(query.select(games_key(None)));
        assert!(query.snapshot().items.is_empty());
        let snapshot = query.ensure().await;
        assert_eq!(snapshot.items, (1..=10).collect::<Vec<Item>>());

        // The key left a moment ago is still cached.
        query.select(games_key(Some(4)));
        assert_eq!(query.snapshot().items, (100..110).collect::<Vec<Item>>());
        assert_eq!(server.calls(), vec![(None, 1), (Some(4), 1), (None, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_fetch_is_deferred_until_reconnect() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 1));
        let connectivity = Connectivity::new(false);
        let query = Arc::new(PagedQuery::new(
            Arc::clone(&server),
            games_key(None),
            policy(),
            connectivity.clone(),
        ));

        let pending = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.ensure().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        let snapshot = query.snapshot();
        assert!(snapshot.is_deferred);
        assert!(snapshot.error.is_none());
        assert!(server.calls().is_empty());

        connectivity.set_online(true);
        let snapshot = pending.await.expect("deferred fetch should not panic");
        assert!(!snapshot.is_deferred);
        assert_eq!(snapshot.items.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_revalidation_keeps_cached_items_visible() {
        let server = Arc::new(MockServer::default().with_catalog(None, 1, 10, 1));
        let connectivity = Connectivity::default();
        let query = Arc::new(PagedQuery::new(
            Arc::clone(&server),
            games_key(None),
            policy().with_stale_time(Duration::ZERO),
            connectivity.clone(),
        ));
        query.ensure().await;
        connectivity.set_online(false);

        let pending = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.revalidate().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        let snapshot = query.snapshot();
        assert!(snapshot.is_deferred);
        assert_eq!(snapshot.items.len(), 10);

        connectivity.set_online(true);
        pending.await.expect("deferred fetch should not panic");
        assert_eq!(server.calls().len(), 2);
    }

    #[tokio::test]
    async fn fetch_page_uses_active_filters_without_caching() {
        let server = Arc::new(MockServer::default().with_catalog(Some(4), 100, 10, 2));
        let query = query(&server, policy());
        query.select(games_key(Some(4)));

        let page = query.fetch_page(2).await.expect("page 2 should load");
        assert_eq!(page.results, (110..120).collect::<Vec<Item>>());
        assert!(!page.has_next());
        assert!(query.snapshot().items.is_empty());
        assert_eq!(server.calls(), vec![(Some(4), 2)]);
    }
}
