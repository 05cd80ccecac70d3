use std::str::FromStr;

use url::Url;

use super::common::{Query, QueryCommon};

/// Query for `/v1/mods/search`.
#[derive(Clone, Debug)]
pub struct ModSearchQuery {
    pub common: QueryCommon,
    pub game_id: i64,
    pub sort_field: ModSortField,
    /// Restrict results to mods with a file for this game version.
    pub game_version: Option<String>,
    pub class_id: Option<i64>,
}

impl Default for ModSearchQuery {
    fn default() -> Self {
        Self {
            common: QueryCommon::default(),
            game_id: 1,
            sort_field: ModSortField::default(),
            game_version: None,
            class_id: None,
        }
    }
}

impl Query for ModSearchQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }

    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("gameId", &self.game_id.to_string());
        url.query_pairs_mut()
            .append_pair("sortField", &(self.sort_field as u8).to_string());
        if let Some(class_id) = self.class_id {
            url.query_pairs_mut()
                .append_pair("classId", &class_id.to_string());
        }
        if let Some(version) = &self.game_version {
            url.query_pairs_mut()
                .append_pair("gameVersion", version.as_str());
        }
        self.common.add_to_url(&url)
    }
}

impl ModSearchQuery {
    pub fn with_game_id(mut self, game_id: i64) -> Self {
        self.game_id = game_id;
        self
    }

    pub fn with_sort_field(mut self, sort_field: ModSortField) -> Self {
        self.sort_field = sort_field;
        self
    }

    pub fn with_game_version(mut self, version: &str) -> Self {
        self.game_version = Some(version.to_string());
        self
    }

    pub fn with_class_id(mut self, class_id: i64) -> Self {
        self.class_id = Some(class_id);
        self
    }
}

/// Upstream `sortField` values. Only a handful are useful for catalog coverage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModSortField {
    Featured = 1,
    #[default]
    Popularity = 2,
    LastUpdated = 3,
    Name = 4,
    Author = 5,
    TotalDownloads = 6,
}

impl std::fmt::Display for ModSortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModSortField::Featured => "featured",
            ModSortField::Popularity => "popularity",
            ModSortField::LastUpdated => "last-updated",
            ModSortField::Name => "name",
            ModSortField::Author => "author",
            ModSortField::TotalDownloads => "total-downloads",
        })
    }
}

impl FromStr for ModSortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "featured" | "1" => Ok(ModSortField::Featured),
            "popularity" | "2" => Ok(ModSortField::Popularity),
            "last-updated" | "3" => Ok(ModSortField::LastUpdated),
            "name" | "4" => Ok(ModSortField::Name),
            "author" | "5" => Ok(ModSortField::Author),
            "total-downloads" | "6" => Ok(ModSortField::TotalDownloads),
            _ => Err(()),
        }
    }
}
