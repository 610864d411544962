use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{AppError, AppResult};

pub const RAW_PREFIX: &str = "raw/";
pub const PROCESSED_PREFIX: &str = "processed/";

pub const RAW_WEEKLY_PREFIX: &str = "raw/weekly/";
pub const RAW_HISTORICAL_PREFIX: &str = "raw/historical/";
pub const PROCESSED_WEEKLY_PREFIX: &str = "processed/weekly/";
pub const HISTORY_KEY: &str = "processed/history/nyt_history_weekly.csv";
pub const RECOMMENDATIONS_KEY: &str = "processed/recommendations/recommendations.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
// "YYYY-MM-DD_HH-MM-SS" and "YYYY-MM-DD"
const TIMESTAMP_LEN: usize = 19;
const DATE_LEN: usize = 10;

/// Key of a freshly fetched weekly snapshot
pub fn raw_weekly_key(list_name: &str, fetched_at: NaiveDateTime) -> String {
    format!(
        "{}nyt_{}_{}.json",
        RAW_WEEKLY_PREFIX,
        list_name,
        fetched_at.format(TIMESTAMP_FORMAT)
    )
}

/// Key of a historical snapshot fetched for a given list date
pub fn raw_historical_key(list_name: &str, date: NaiveDate) -> String {
    format!(
        "{}nyt_{}_{}.json",
        RAW_HISTORICAL_PREFIX,
        list_name,
        date.format(DATE_FORMAT)
    )
}

pub fn weekly_view_key(week: NaiveDate) -> String {
    format!(
        "{}nyt_transformed_{}.csv",
        PROCESSED_WEEKLY_PREFIX,
        week.format(DATE_FORMAT)
    )
}

/// Sibling key of a weekly view for its enriched copy
pub fn enriched_key(weekly_key: &str) -> String {
    match weekly_key.strip_suffix(".csv") {
        Some(stem) => format!("{}_apple.csv", stem),
        None => format!("{}_apple", weekly_key),
    }
}

/// Parses the sortable timestamp embedded at the end of a snapshot key
///
/// Accepts `..._YYYY-MM-DD_HH-MM-SS.json` and `..._YYYY-MM-DD.json`; a bare
/// date sorts as midnight.
pub fn snapshot_timestamp(key: &str) -> Option<NaiveDateTime> {
    let file_name = key.rsplit('/').next()?;
    let stem = file_name.strip_suffix(".json")?;

    // `get` rather than indexing: a non-ASCII stem may not split on a char boundary
    let tail = |len: usize| stem.len().checked_sub(len).and_then(|start| stem.get(start..));

    if let Some(ts) = tail(TIMESTAMP_LEN)
        .and_then(|t| NaiveDateTime::parse_from_str(t, TIMESTAMP_FORMAT).ok())
    {
        return Some(ts);
    }

    tail(DATE_LEN)
        .and_then(|t| NaiveDate::parse_from_str(t, DATE_FORMAT).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Picks the most recent snapshot by its parsed timestamp
///
/// Keys without a parsable timestamp are skipped. Ties on timestamp fall
/// back to key order.
pub fn latest_snapshot_key(keys: &[String]) -> AppResult<&str> {
    let mut latest: Option<(NaiveDateTime, &str)> = None;

    for key in keys {
        match snapshot_timestamp(key) {
            Some(ts) => {
                let candidate = (ts, key.as_str());
                if latest.map_or(true, |current| candidate > current) {
                    latest = Some(candidate);
                }
            }
            None => {
                tracing::warn!(key = %key, "Ignoring snapshot key without sortable timestamp");
            }
        }
    }

    latest
        .map(|(_, key)| key)
        .ok_or_else(|| AppError::NotFound("No raw snapshots found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_non_ascii_keys_are_ignored() {
        assert_eq!(snapshot_timestamp("raw/weekly/nyt_ééééééééééé.json"), None);
        assert_eq!(snapshot_timestamp("raw/weekly/é.json"), None);

        let keys = vec![
            "raw/weekly/nyt_hardcover-fiction_2024-02-04_09-00-00.json".to_string(),
            "raw/weekly/nyt_ééééééééééé.json".to_string(),
        ];
        assert_eq!(
            latest_snapshot_key(&keys).unwrap(),
            "raw/weekly/nyt_hardcover-fiction_2024-02-04_09-00-00.json"
        );
    }

    #[test]
    fn test_raw_weekly_key_format() {
        let key = raw_weekly_key("hardcover-fiction", ts("2024-02-11_09-05-03"));
        assert_eq!(
            key,
            "raw/weekly/nyt_hardcover-fiction_2024-02-11_09-05-03.json"
        );
    }

    #[test]
    fn test_snapshot_timestamp_parses_both_forms() {
        assert_eq!(
            snapshot_timestamp("raw/weekly/nyt_hardcover-fiction_2024-02-11_09-05-03.json"),
            Some(ts("2024-02-11_09-05-03"))
        );
        assert_eq!(
            snapshot_timestamp("raw/historical/nyt_hardcover-fiction_2024-02-11.json"),
            Some(ts("2024-02-11_00-00-00"))
        );
        assert_eq!(snapshot_timestamp("raw/weekly/notes.json"), None);
        assert_eq!(snapshot_timestamp("raw/weekly/nyt_x_2024-02-11.csv"), None);
    }

    #[test]
    fn test_latest_snapshot_uses_parsed_time_not_string_order() {
        // A list name that sorts after the others must not win on string order
        let keys = vec![
            "raw/weekly/nyt_zz-list_2024-01-07_10-00-00.json".to_string(),
            "raw/weekly/nyt_hardcover-fiction_2024-02-11_09-00-00.json".to_string(),
            "raw/weekly/nyt_hardcover-fiction_2024-02-04_09-00-00.json".to_string(),
        ];

        assert_eq!(
            latest_snapshot_key(&keys).unwrap(),
            "raw/weekly/nyt_hardcover-fiction_2024-02-11_09-00-00.json"
        );
    }

    #[test]
    fn test_latest_snapshot_ignores_unparsable_keys() {
        let keys = vec![
            "raw/weekly/readme.json".to_string(),
            "raw/weekly/nyt_hardcover-fiction_2024-02-04_09-00-00.json".to_string(),
        ];

        assert_eq!(
            latest_snapshot_key(&keys).unwrap(),
            "raw/weekly/nyt_hardcover-fiction_2024-02-04_09-00-00.json"
        );
    }

    #[test]
    fn test_latest_snapshot_none_is_not_found() {
        let keys = vec!["raw/weekly/readme.json".to_string()];
        assert!(matches!(
            latest_snapshot_key(&keys),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(latest_snapshot_key(&[]), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_enriched_key() {
        assert_eq!(
            enriched_key("processed/weekly/nyt_transformed_2024-02-11.csv"),
            "processed/weekly/nyt_transformed_2024-02-11_apple.csv"
        );
    }
}
