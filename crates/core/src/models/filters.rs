use super::Genre;
use crate::store::Selection;

/// Orderings offered by the sort picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Server default ordering.
    Relevance,
    /// Most recently added first.
    DateAdded,
    /// Alphabetical.
    Name,
    /// By release date.
    ReleaseDate,
    /// By Metacritic score.
    Popularity,
    /// By user rating.
    AverageRating,
}

impl SortOrder {
    /// Every option in picker order.
    pub const ALL: [SortOrder; 6] = [
        SortOrder::Relevance,
        SortOrder::DateAdded,
        SortOrder::Name,
        SortOrder::ReleaseDate,
        SortOrder::Popularity,
        SortOrder::AverageRating,
    ];

    /// Label shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Relevance => "Relevance",
            SortOrder::DateAdded => "Date added",
            SortOrder::Name => "Name",
            SortOrder::ReleaseDate => "Release Date",
            SortOrder::Popularity => "Popularity",
            SortOrder::AverageRating => "Average Rating",
        }
    }

    /// Value sent as `ordering`. Relevance is the server default and sends nothing.
    pub fn ordering(self) -> Option<&'static str> {
        match self {
            SortOrder::Relevance => None,
            SortOrder::DateAdded => Some("added"),
            SortOrder::Name => Some("name"),
            SortOrder::ReleaseDate => Some("released"),
            SortOrder::Popularity => Some("metacritic"),
            SortOrder::AverageRating => Some("rating"),
        }
    }

    /// Resolve a stored ordering value back to its option.
    pub fn from_ordering(value: Option<&str>) -> Self {
        let value = value.unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|order| order.ordering().unwrap_or_default() == value)
            .unwrap_or(SortOrder::Relevance)
    }

    /// The option after this one, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL
            .iter()
            .position(|order| *order == self)
            .unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

/// Title for the game list given the active filters.
pub fn heading(selection: &Selection) -> String {
    let genre = selection.selected_genre.as_ref().map(|g| g.name.as_str());
    let platform = selection.selected_platform.as_ref().map(|p| p.name.as_str());
    if genre.is_none() && platform.is_none() {
        return "New & Trending".to_string();
    }
    let label = format!("{} {}", genre.unwrap_or_default(), platform.unwrap_or_default());
    format!("{} Games", label.trim())
}

/// Case-insensitive substring filter over genre names. A blank query keeps everything.
pub fn filter_genres<'a>(genres: &'a [Genre], query: &str) -> Vec<&'a Genre> {
    let needle = query.trim().to_lowercase();
    genres
        .iter()
        .filter(|genre| needle.is_empty() || genre.name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn genre(id: u64, name: &str) -> Genre {
        Genre {
            id,
            name: name.to_string(),
            image_background: None,
        }
    }

    #[test]
    fn sort_order_round_trips_through_ordering_values() {
        for order in SortOrder::ALL {
            assert_eq!(SortOrder::from_ordering(order.ordering()), order);
        }
        assert_eq!(SortOrder::from_ordering(Some("bogus")), SortOrder::Relevance);
        assert_eq!(SortOrder::AverageRating.next(), SortOrder::Relevance);
        assert_eq!(SortOrder::Relevance.next(), SortOrder::DateAdded);
    }

    #[test]
    fn heading_reflects_selected_filters() {
        let mut selection = Selection::default();
        assert_eq!(heading(&selection), "New & Trending");

        selection.selected_genre = Some(genre(4, "Action"));
        assert_eq!(heading(&selection), "Action Games");

        selection.selected_platform = Some(Platform {
            id: 2,
            name: "PlayStation".to_string(),
            slug: "playstation".to_string(),
        });
        assert_eq!(heading(&selection), "Action PlayStation Games");

        selection.selected_genre = None;
        assert_eq!(heading(&selection), "PlayStation Games");
    }

    #[test]
    fn genre_filter_is_case_insensitive() {
        let genres = vec![genre(4, "Action"), genre(5, "RPG"), genre(3, "Adventure")];
        let names: Vec<_> = filter_genres(&genres, "  a ")
            .into_iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(names, vec!["Action", "Adventure"]);
        assert_eq!(filter_genres(&genres, "").len(), 3);
        assert!(filter_genres(&genres, "puzzle").is_empty());
    }
}
