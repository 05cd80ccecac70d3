//! Shared query infrastructure: the [`Query`] trait, [`QueryCommon`] fields, and [`SortOrder`].

use std::str::FromStr;

use url::Url;

/// The upstream refuses any request where `index + pageSize` exceeds this.
pub const MAX_RESULT_WINDOW: i64 = 10_000;

/// Trait implemented by all query builders. Provides URL serialization and
/// shared builder methods for pagination and sort order.
pub trait Query {
    /// Appends this query's parameters to the given URL, returning the modified URL.
    fn add_to_url(&self, url: &Url) -> Url;

    /// Returns a mutable reference to the common query fields.
    fn get_common(&mut self) -> &mut QueryCommon;

    /// Sets the zero-based offset of the first result.
    fn with_index(mut self, index: i64) -> Self
    where
        Self: Sized,
    {
        self.get_common().index = index;
        self
    }

    /// Sets the number of results per page.
    fn with_page_size(mut self, page_size: i64) -> Self
    where
        Self: Sized,
    {
        self.get_common().page_size = Some(page_size);
        self
    }

    /// Sets the sort order (ascending or descending).
    fn with_sort_order(mut self, sort_order: SortOrder) -> Self
    where
        Self: Sized,
    {
        self.get_common().sort_order = sort_order;
        self
    }
}

/// Sort order for API results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    /// Largest / newest first. This is the default.
    #[default]
    Desc,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(()),
        }
    }
}

/// Fields shared by all query types: offset pagination and sort order.
#[derive(Clone, Copy, Debug)]
pub struct QueryCommon {
    /// Zero-based offset of the first result. Defaults to 0.
    pub index: i64,
    /// Results per page. `None` uses the API default.
    pub page_size: Option<i64>,
    pub sort_order: SortOrder,
}

impl Default for QueryCommon {
    fn default() -> QueryCommon {
        QueryCommon {
            index: 0,
            page_size: None,
            sort_order: SortOrder::Desc,
        }
    }
}

impl QueryCommon {
    /// Appends the common pagination and ordering parameters to the URL.
    pub fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("index", &self.index.to_string());
        if let Some(page_size) = self.page_size {
            url.query_pairs_mut()
                .append_pair("pageSize", &page_size.to_string());
        };
        url.query_pairs_mut()
            .append_pair("sortOrder", &self.sort_order.to_string());
        url
    }
}
