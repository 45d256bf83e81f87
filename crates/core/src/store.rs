//! Filter selection store shared between the presentation layer and the
//! fetch wiring.
//!
//! The store is an explicit handle rather than a process-wide singleton;
//! clones share the same state. Every setter funnels through
//! [`watch::Sender::send_if_modified`], so assigning the value that is already
//! stored neither mutates state nor wakes subscribers.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::watch;
use tracing::debug;

use crate::models::{Genre, Platform};

/// What the user currently wants to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Genre filter.
    pub selected_genre: Option<Genre>,
    /// Parent platform filter.
    pub selected_platform: Option<Platform>,
    /// API `ordering` value.
    pub sort_order: Option<String>,
    /// Free-text search.
    pub search_text: Option<String>,
    /// Whether the genre picker is open.
    pub is_modal_visible: bool,
}

impl Selection {
    /// Identifier of the selected genre.
    pub fn genre_id(&self) -> Option<u64> {
        self.selected_genre.as_ref().map(|genre| genre.id)
    }

    /// Identifier of the selected platform.
    pub fn platform_id(&self) -> Option<u64> {
        self.selected_platform.as_ref().map(|platform| platform.id)
    }
}

/// Cloneable handle to the shared selection state.
#[derive(Clone)]
pub struct SelectionStore {
    inner: Arc<Inner>,
}

struct Inner {
    sender: watch::Sender<Selection>,
    revision: AtomicU64,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStore {
    /// Create a store with every field empty.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Selection::default());
        Self {
            inner: Arc::new(Inner {
                sender,
                revision: AtomicU64::new(0),
            }),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> Selection {
        self.inner.sender.borrow().clone()
    }

    /// Receiver woken only on effective changes.
    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.inner.sender.subscribe()
    }

    /// Number of effective changes since creation.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Currently selected genre.
    pub fn selected_genre(&self) -> Option<Genre> {
        self.inner.sender.borrow().selected_genre.clone()
    }

    /// Currently selected platform.
    pub fn selected_platform(&self) -> Option<Platform> {
        self.inner.sender.borrow().selected_platform.clone()
    }

    /// Current ordering value.
    pub fn sort_order(&self) -> Option<String> {
        self.inner.sender.borrow().sort_order.clone()
    }

    /// Current search text.
    pub fn search_text(&self) -> Option<String> {
        self.inner.sender.borrow().search_text.clone()
    }

    /// Whether the genre picker is open.
    pub fn is_modal_visible(&self) -> bool {
        self.inner.sender.borrow().is_modal_visible
    }

    /// Select a genre. Compared by id only; returns whether state changed.
    pub fn set_selected_genre(&self, genre: Option<Genre>) -> bool {
        self.update("selected_genre", |state| {
            if state.genre_id() == genre.as_ref().map(|g| g.id) {
                return false;
            }
            state.selected_genre = genre;
            true
        })
    }

    /// Select a platform. Compared by id only; returns whether state changed.
    pub fn set_selected_platform(&self, platform: Option<Platform>) -> bool {
        self.update("selected_platform", |state| {
            if state.platform_id() == platform.as_ref().map(|p| p.id) {
                return false;
            }
            state.selected_platform = platform;
            true
        })
    }

    /// Set the ordering value. Blank strings clear it.
    pub fn set_sort_order(&self, sort_order: Option<String>) -> bool {
        let sort_order = normalize(sort_order);
        self.update("sort_order", |state| {
            if state.sort_order == sort_order {
                return false;
            }
            state.sort_order = sort_order;
            true
        })
    }

    /// Set the search text. Input is trimmed and blank strings clear it.
    pub fn set_search_text(&self, search_text: Option<String>) -> bool {
        let search_text = normalize(search_text);
        self.update("search_text", |state| {
            if state.search_text == search_text {
                return false;
            }
            state.search_text = search_text;
            true
        })
    }

    /// Set picker visibility to `visible`.
    pub fn set_is_modal_visible(&self, visible: bool) -> bool {
        self.update("is_modal_visible", |state| {
            if state.is_modal_visible == visible {
                return false;
            }
            state.is_modal_visible = visible;
            true
        })
    }

    /// Invert picker visibility.
    pub fn toggle_modal(&self) -> bool {
        self.update("is_modal_visible", |state| {
            state.is_modal_visible = !state.is_modal_visible;
            true
        })
    }

    /// Reset genre, platform, ordering and search in a single change.
    pub fn clear_filters(&self) -> bool {
        self.update("filters", |state| {
            let cleared = Selection {
                is_modal_visible: state.is_modal_visible,
                ..Selection::default()
            };
            if *state == cleared {
                return false;
            }
            *state = cleared;
            true
        })
    }

    fn update(&self, field: &'static str, modify: impl FnOnce(&mut Selection) -> bool) -> bool {
        let changed = self.inner.sender.send_if_modified(modify);
        if changed {
            let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(field, revision, "selection changed");
        }
        changed
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
