use std::fmt;

use crate::{client::ListParams, store::Selection};

/// Identity of one logical paginated query.
///
/// Built as a pure function of a selection snapshot, so equal selections
/// always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Resource name, e.g. `games`.
    pub resource: &'static str,
    /// Selected genre id.
    pub genre: Option<u64>,
    /// Selected platform id.
    pub platform: Option<u64>,
    /// Search text, empty when unset.
    pub search: String,
    /// Ordering value, empty when unset.
    pub ordering: String,
}

impl QueryKey {
    /// Unfiltered key for `resource`.
    pub fn resource(resource: &'static str) -> Self {
        Self {
            resource,
            genre: None,
            platform: None,
            search: String::new(),
            ordering: String::new(),
        }
    }

    /// Key for `resource` filtered by the given selection.
    ///
    /// Modal visibility is not part of the key.
    pub fn from_selection(resource: &'static str, selection: &Selection) -> Self {
        Self {
            resource,
            genre: selection.genre_id(),
            platform: selection.platform_id(),
            search: selection.search_text.clone().unwrap_or_default(),
            ordering: selection.sort_order.clone().unwrap_or_default(),
        }
    }

    /// List parameters for page `page` of this query.
    pub fn params(&self, page: u32) -> ListParams {
        ListParams {
            genres: self.genre,
            platforms: self.platform,
            search: Some(self.search.clone()).filter(|s| !s.is_empty()),
            ordering: Some(self.ordering.clone()).filter(|s| !s.is_empty()),
            page: Some(page),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        write!(
            f,
            "{}[genre={} platform={} search={:?} ordering={:?}]",
            self.resource,
            id(self.genre),
            id(self.platform),
            self.search,
            self.ordering
        )
    }
}
