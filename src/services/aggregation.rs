use std::collections::BTreeMap;

use crate::models::HistoryRow;

/// All observations of one title, oldest first
///
/// Title identity is the literal title string. Rows sharing a week keep
/// their table order.
#[derive(Debug, Clone)]
pub struct TitleSeries<'a> {
    pub title: &'a str,
    pub rows: Vec<&'a HistoryRow>,
}

impl<'a> TitleSeries<'a> {
    pub fn appearances(&self) -> usize {
        self.rows.len()
    }

    /// Chronologically latest row; last in table order among same-week rows
    pub fn latest(&self) -> Option<&'a HistoryRow> {
        self.rows.last().copied()
    }

    pub fn ranks(&self) -> Vec<u32> {
        self.rows.iter().map(|row| row.rank).collect()
    }

    /// Author and publisher as of the latest observation
    pub fn attribution(&self) -> (String, String) {
        self.latest()
            .map(|row| (row.author.clone(), row.publisher.clone()))
            .unwrap_or_default()
    }
}

/// Groups rows by title, in ascending title order
pub fn group_by_title(rows: &[HistoryRow]) -> Vec<TitleSeries<'_>> {
    let mut groups: BTreeMap<&str, Vec<&HistoryRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.title.as_str()).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(title, mut rows)| {
            // Stable, so same-week rows keep table order
            rows.sort_by_key(|row| row.published_date);
            TitleSeries { title, rows }
        })
        .collect()
}

/// Week-over-week movement of a row: the rank it came from and the signed delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub from: u32,
    pub change: i64,
}

/// Rank change of `row` against its prior week
///
/// The explicit `rank_last_week` is authoritative when present. A value of 0
/// marks a new entrant whose movement is undefined. Only when the field is
/// missing does the previous observation of the same title stand in.
pub fn rank_change(previous: Option<&HistoryRow>, row: &HistoryRow) -> Option<Movement> {
    match row.rank_last_week {
        Some(0) => None,
        Some(from) => Some(Movement {
            from,
            change: i64::from(row.rank) - i64::from(from),
        }),
        None => previous.map(|prev| Movement {
            from: prev.rank,
            change: i64::from(row.rank) - i64::from(prev.rank),
        }),
    }
}

/// Chronological first-difference of rank between consecutive observations
///
/// Undefined for a title's first observation and for new entrants.
pub fn rank_diff(previous: Option<&HistoryRow>, row: &HistoryRow) -> Option<i64> {
    if row.rank_last_week == Some(0) {
        return None;
    }
    previous.map(|prev| i64::from(row.rank) - i64::from(prev.rank))
}

pub fn mean(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
}

/// Median; the mean of the two middle values for an even count
pub fn median(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        (f64::from(sorted[mid - 1]) + f64::from(sorted[mid])) / 2.0
    } else {
        f64::from(sorted[mid])
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::row;
    use super::*;

    #[test]
    fn test_group_by_title_orders_chronologically() {
        let rows = vec![
            row("2024-01-21", "B", 3, Some(4)),
            row("2024-01-07", "A", 1, Some(0)),
            row("2024-01-14", "B", 4, Some(0)),
            row("2024-01-14", "A", 2, Some(1)),
        ];

        let groups = group_by_title(&rows);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].title, "A");
        assert_eq!(groups[0].ranks(), vec![1, 2]);
        assert_eq!(groups[1].title, "B");
        assert_eq!(groups[1].ranks(), vec![4, 3]);
        assert_eq!(groups[1].latest().unwrap().rank, 3);
    }

    #[test]
    fn test_rank_change_prefers_explicit_field() {
        let prev = row("2024-01-07", "A", 9, Some(0));
        let current = row("2024-01-14", "A", 5, Some(8));

        assert_eq!(
            rank_change(Some(&prev), &current),
            Some(Movement { from: 8, change: -3 })
        );
    }

    #[test]
    fn test_rank_change_new_entrant_is_undefined() {
        let prev = row("2024-01-07", "A", 9, Some(3));
        let current = row("2024-01-14", "A", 5, Some(0));

        assert_eq!(rank_change(Some(&prev), &current), None);
        assert_eq!(rank_diff(Some(&prev), &current), None);
    }

    #[test]
    fn test_rank_change_falls_back_to_previous_row() {
        let prev = row("2024-01-07", "A", 9, None);
        let current = row("2024-01-14", "A", 5, None);

        assert_eq!(
            rank_change(Some(&prev), &current),
            Some(Movement { from: 9, change: -4 })
        );
        assert_eq!(rank_change(None, &current), None);
    }

    #[test]
    fn test_rank_diff_first_observation_undefined() {
        let first = row("2024-01-07", "A", 9, Some(10));
        assert_eq!(rank_diff(None, &first), None);

        let second = row("2024-01-14", "A", 6, Some(9));
        assert_eq!(rank_diff(Some(&first), &second), Some(-3));
    }

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[1, 2, 3, 6]), 3.0);
        assert_eq!(median(&[6, 1, 3]), 3.0);
        assert_eq!(median(&[6, 1, 3, 2]), 2.5);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(median(&[]), 0.0);
    }
}
