mod common;
pub use self::common::{Query, QueryCommon, SortOrder, MAX_RESULT_WINDOW};

mod search;
pub use self::search::{ModSearchQuery, ModSortField};
