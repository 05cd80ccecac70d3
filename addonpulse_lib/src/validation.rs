use std::str::FromStr;

use curseforge_api::ModSortField;

use crate::error::InputError;
use crate::trending::Leaderboard;

pub const MAX_GAME_VERSION_LENGTH: usize = 32;

/// The upstream rejects larger pages.
pub const MAX_PAGE_SIZE: i64 = 50;

pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Sort strategies usable for catalog coverage, in default sync order.
pub const SYNC_STRATEGIES: &[ModSortField] = &[
    ModSortField::Popularity,
    ModSortField::LastUpdated,
    ModSortField::TotalDownloads,
];

/// Strip ASCII control characters (0x00-0x1F except space 0x20), trim whitespace,
/// and enforce a byte-length limit.
pub fn sanitize_text(input: &str, max_len: usize) -> Result<String, InputError> {
    if input.len() > max_len {
        return Err(InputError::InvalidInput(format!(
            "input exceeds maximum length of {} bytes",
            max_len
        )));
    }
    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_ascii_control() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string();
    if sanitized.is_empty() {
        return Err(InputError::InvalidInput(
            "input is empty after sanitization".to_string(),
        ));
    }
    Ok(sanitized)
}

/// Validate a game version filter such as `1.20.1` or `1.21-Snapshot`.
pub fn validate_game_version(input: &str) -> Result<String, InputError> {
    let version = sanitize_text(input, MAX_GAME_VERSION_LENGTH)?;
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(InputError::InvalidInput(format!(
            "invalid game version '{}'. Use letters, digits, '.', '-' or '_'",
            version
        )));
    }
    Ok(version)
}

/// Validate page size (must be 1..=50).
pub fn validate_page_size(page_size: i64) -> Result<i64, InputError> {
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(InputError::InvalidInput(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(page_size)
}

/// Validate the per-strategy page cap (must be >= 1).
pub fn validate_max_pages(max_pages: i64) -> Result<i64, InputError> {
    if max_pages < 1 {
        return Err(InputError::InvalidInput(
            "max_pages must be >= 1".to_string(),
        ));
    }
    Ok(max_pages)
}

/// Parse a comma-separated strategy list, e.g. `popularity,last-updated`.
/// Order is kept because it decides which record wins on duplicates.
pub fn parse_strategies(input: &str) -> Result<Vec<ModSortField>, InputError> {
    let mut out = Vec::new();
    for raw in input.split(',') {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        let field = ModSortField::from_str(&name)
            .ok()
            .filter(|f| SYNC_STRATEGIES.contains(f))
            .ok_or_else(|| {
                InputError::InvalidInput(format!(
                    "unknown strategy '{}'. Valid values: popularity, last-updated, total-downloads",
                    raw.trim()
                ))
            })?;
        if !out.contains(&field) {
            out.push(field);
        }
    }
    if out.is_empty() {
        return Err(InputError::InvalidInput(
            "at least one strategy is required".to_string(),
        ));
    }
    Ok(out)
}

/// Validate a leaderboard name: case-insensitive `hot` or `rising`.
pub fn validate_board(input: &str) -> Result<Leaderboard, InputError> {
    Leaderboard::from_str(&input.trim().to_lowercase()).map_err(InputError::InvalidInput)
}

/// Validate a leaderboard row limit (must be 1..=100).
pub fn validate_limit(limit: usize) -> Result<usize, InputError> {
    if !(1..=MAX_LEADERBOARD_LIMIT).contains(&limit) {
        return Err(InputError::InvalidInput(format!(
            "limit must be between 1 and {}",
            MAX_LEADERBOARD_LIMIT
        )));
    }
    Ok(limit)
}
