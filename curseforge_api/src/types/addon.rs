//! Mod (add-on) records as returned by the search endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Numeric identifier for a mod.
pub type ModID = i64;

/// One entry from `/v1/mods/search`. Fields the pipeline does not consume are
/// ignored during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mod {
    pub id: ModID,
    pub name: String,
    pub slug: String,

    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(default)]
    pub categories: Vec<Category>,

    pub logo: Option<Logo>,

    /// Lifetime downloads. The upstream sometimes serializes this as a float.
    #[serde(deserialize_with = "count_from_number")]
    pub download_count: i64,

    #[serde(default, deserialize_with = "count_from_number")]
    pub thumbs_up_count: i64,

    #[serde(default)]
    pub game_popularity_rank: Option<i64>,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub date_released: Option<DateTime<Utc>>,

    #[serde(default)]
    pub latest_files: Vec<File>,

    #[serde(default)]
    pub latest_files_indexes: Vec<FileIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logo {
    pub thumbnail_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: i64,
    pub file_date: DateTime<Utc>,
    #[serde(default)]
    pub game_versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndex {
    pub game_version: String,
    pub file_id: Option<i64>,
}

impl Mod {
    /// Name of the first listed author, which the upstream treats as the owner.
    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.name.as_str())
    }

    /// Newest file date among the latest files, falling back to the release date.
    pub fn latest_file_date(&self) -> Option<DateTime<Utc>> {
        self.latest_files
            .iter()
            .map(|f| f.file_date)
            .max()
            .or(self.date_released)
    }

    /// Distinct game-version tags across the latest files and file indexes,
    /// sorted for stable storage.
    pub fn game_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .latest_files_indexes
            .iter()
            .map(|idx| idx.game_version.clone())
            .chain(
                self.latest_files
                    .iter()
                    .flat_map(|f| f.game_versions.iter().cloned()),
            )
            .filter(|v| !v.is_empty())
            .collect();
        versions.sort();
        versions.dedup();
        versions
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }
}

fn count_from_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Ok(f as i64),
        _ => Err(serde::de::Error::custom(format!(
            "invalid count value: {}",
            value
        ))),
    }
}
