use std::sync::Arc;

use crate::{
    db::blob::{keys::RECOMMENDATIONS_KEY, BlobStore, Precondition},
    error::AppResult,
    models::{
        Category, CategoryMetrics, ConsistentMetrics, FastMoverMetrics, HistoryRow, HistoryTable,
        MomentumMetrics, RecommendationRow, RecommendationTable,
    },
    services::{
        aggregation::{group_by_title, mean, median, rank_change, rank_diff, TitleSeries},
        history::read_history,
    },
};

const MIN_MOVER_APPEARANCES: usize = 2;
const MIN_CONSISTENT_APPEARANCES: usize = 5;
const MAX_CONSISTENT_MEAN_RANK: f64 = 10.0;
const MIN_MOMENTUM_APPEARANCES: usize = 2;
const TOP_N: usize = 10;

/// Derives the recommendation categories from one immutable history snapshot
pub struct RecommendationEngine<'a> {
    series: Vec<TitleSeries<'a>>,
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(history: &'a HistoryTable) -> Self {
        Self {
            series: group_by_title(history.rows()),
        }
    }

    /// Runs every category and concatenates them in category order
    pub fn build(&self) -> RecommendationTable {
        let mut rows = self.fast_movers();
        rows.extend(self.consistent_performers());
        rows.extend(self.sustained_momentum());
        RecommendationTable::new(rows)
    }

    /// Titles whose latest week improved on the week before
    ///
    /// Sorted by rank change, then current rank, then longer tenure; the
    /// title breaks any remaining tie.
    pub fn fast_movers(&self) -> Vec<RecommendationRow> {
        let mut movers: Vec<(&TitleSeries<'a>, &HistoryRow, FastMoverMetrics)> = self
            .series
            .iter()
            .filter(|series| series.appearances() >= MIN_MOVER_APPEARANCES)
            .filter_map(|series| {
                let latest = series.latest()?;
                let previous = series.rows.len().checked_sub(2).map(|i| series.rows[i]);
                let movement = rank_change(previous, latest)?;
                if movement.change >= 0 {
                    return None;
                }

                let metrics = FastMoverMetrics {
                    published_date: latest.published_date,
                    rank: latest.rank,
                    rank_last_week: movement.from,
                    rank_change: movement.change,
                    weeks_on_list: latest.weeks_on_list,
                    total_appearances: series.appearances(),
                };
                Some((series, latest, metrics))
            })
            .collect();

        movers.sort_by(|(_, _, a), (_, _, b)| {
            a.rank_change
                .cmp(&b.rank_change)
                .then(a.rank.cmp(&b.rank))
                .then(b.weeks_on_list.cmp(&a.weeks_on_list))
        });

        movers
            .into_iter()
            .map(|(series, latest, metrics)| RecommendationRow {
                title: series.title.to_string(),
                author: latest.author.clone(),
                publisher: latest.publisher.clone(),
                category: Category::FastMovers,
                reason: format!(
                    "Rank improved by {} vs last week (from #{} to #{}).",
                    metrics.rank_change.unsigned_abs(),
                    metrics.rank_last_week,
                    metrics.rank
                ),
                metrics: CategoryMetrics::FastMover(metrics),
            })
            .collect()
    }

    /// Long-running titles with a strong average rank, top 10 by median rank
    pub fn consistent_performers(&self) -> Vec<RecommendationRow> {
        let mut performers: Vec<(&TitleSeries<'a>, ConsistentMetrics)> = self
            .series
            .iter()
            .filter_map(|series| {
                let ranks = series.ranks();
                let metrics = ConsistentMetrics {
                    total_appearances: series.appearances(),
                    avg_rank: mean(&ranks),
                    median_rank: median(&ranks),
                    max_weeks_on_list: series
                        .rows
                        .iter()
                        .map(|row| row.weeks_on_list)
                        .max()
                        .unwrap_or(0),
                };

                let qualifies = metrics.total_appearances >= MIN_CONSISTENT_APPEARANCES
                    && metrics.avg_rank <= MAX_CONSISTENT_MEAN_RANK;
                qualifies.then_some((series, metrics))
            })
            .collect();

        performers.sort_by(|(_, a), (_, b)| {
            a.median_rank
                .total_cmp(&b.median_rank)
                .then(b.total_appearances.cmp(&a.total_appearances))
                .then(a.avg_rank.total_cmp(&b.avg_rank))
        });
        performers.truncate(TOP_N);

        performers
            .into_iter()
            .map(|(series, metrics)| {
                let (author, publisher) = series.attribution();
                RecommendationRow {
                    title: series.title.to_string(),
                    author,
                    publisher,
                    category: Category::ConsistentPerformers,
                    reason: format!(
                        "Appeared on the bestseller list for {} weeks with a median rank of #{}.",
                        metrics.total_appearances,
                        metrics.median_rank.trunc() as i64
                    ),
                    metrics: CategoryMetrics::Consistent(metrics),
                }
            })
            .collect()
    }

    /// Titles with net improvement across their tracked weeks, top 10
    pub fn sustained_momentum(&self) -> Vec<RecommendationRow> {
        let mut rising: Vec<(&TitleSeries<'a>, MomentumMetrics)> = self
            .series
            .iter()
            .filter_map(|series| {
                let moves: Vec<(u32, i64)> = series
                    .rows
                    .iter()
                    .enumerate()
                    .filter_map(|(i, row)| {
                        let previous = i.checked_sub(1).map(|j| series.rows[j]);
                        rank_diff(previous, row).map(|diff| (row.rank, diff))
                    })
                    .collect();

                if moves.len() < MIN_MOMENTUM_APPEARANCES {
                    return None;
                }

                let total_rank_change: i64 = moves.iter().map(|(_, diff)| diff).sum();
                if total_rank_change >= 0 {
                    return None;
                }

                let ranks: Vec<u32> = moves.iter().map(|(rank, _)| *rank).collect();
                let metrics = MomentumMetrics {
                    appearances: moves.len(),
                    avg_rank: mean(&ranks),
                    total_rank_change,
                    best_rank: ranks.iter().copied().min().unwrap_or(0),
                };
                Some((series, metrics))
            })
            .collect();

        rising.sort_by_key(|(_, metrics)| metrics.total_rank_change);
        rising.truncate(TOP_N);

        rising
            .into_iter()
            .map(|(series, metrics)| {
                let (author, publisher) = series.attribution();
                RecommendationRow {
                    title: series.title.to_string(),
                    author,
                    publisher,
                    category: Category::SustainedMomentum,
                    reason: format!(
                        "Improved by {} positions overall across {} weeks (best rank #{}).",
                        metrics.total_rank_change.unsigned_abs(),
                        metrics.appearances,
                        metrics.best_rank
                    ),
                    metrics: CategoryMetrics::Momentum(metrics),
                }
            })
            .collect()
    }
}

/// Builds the full recommendation table; empty history yields an empty table
pub fn build_recommendations(history: &HistoryTable) -> RecommendationTable {
    RecommendationEngine::new(history).build()
}

/// Location and content of a persisted recommendation table
#[derive(Debug, Clone)]
pub struct RecommendationOutput {
    pub key: String,
    pub uri: String,
    pub table: RecommendationTable,
}

/// Loads the history and persists the derived recommendation table
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn BlobStore>,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Derives recommendations from the current history without persisting
    pub async fn current(&self) -> AppResult<RecommendationTable> {
        let history = read_history(self.store.as_ref()).await?;
        Ok(build_recommendations(&history))
    }

    /// Recomputes the table in full and replaces the previous output
    pub async fn rebuild(&self) -> AppResult<RecommendationOutput> {
        let history = read_history(self.store.as_ref()).await?;
        let table = build_recommendations(&history);

        let uri = self
            .store
            .put(RECOMMENDATIONS_KEY, table.to_csv()?, Precondition::None)
            .await?;

        tracing::info!(
            history_rows = history.len(),
            fast_movers = table.by_category(Category::FastMovers).count(),
            consistent_performers = table.by_category(Category::ConsistentPerformers).count(),
            sustained_momentum = table.by_category(Category::SustainedMomentum).count(),
            uri = %uri,
            "Recommendations rebuilt"
        );

        Ok(RecommendationOutput {
            key: RECOMMENDATIONS_KEY.to_string(),
            uri,
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::blob::keys::HISTORY_KEY;
    use crate::db::MemoryBlobStore;
    use crate::services::aggregation::test_support::row;

    fn weeks(n: usize) -> Vec<String> {
        let start: chrono::NaiveDate = "2024-01-07".parse().unwrap();
        (0..n)
            .map(|i| (start + chrono::Duration::weeks(i as i64)).to_string())
            .collect()
    }

    #[test]
    fn test_empty_history_yields_empty_table() {
        let table = build_recommendations(&HistoryTable::default());
        assert!(table.is_empty());
    }

    #[test]
    fn test_fast_mover_scenario() {
        let history = HistoryTable::new(vec![
            row("2024-01-07", "RISING", 8, Some(0)),
            row("2024-01-14", "RISING", 5, Some(8)),
        ]);

        let movers = RecommendationEngine::new(&history).fast_movers();

        assert_eq!(movers.len(), 1);
        assert_eq!(movers[0].title, "RISING");
        assert_eq!(movers[0].reason, "Rank improved by 3 vs last week (from #8 to #5).");
        match &movers[0].metrics {
            CategoryMetrics::FastMover(m) => {
                assert_eq!(m.rank_change, -3);
                assert_eq!(m.total_appearances, 2);
            }
            other => panic!("unexpected metrics {:?}", other),
        }
    }

    #[test]
    fn test_single_new_entrant_is_excluded_everywhere() {
        let history = HistoryTable::new(vec![row("2024-01-07", "DEBUT", 1, Some(0))]);
        let table = build_recommendations(&history);
        assert!(table.is_empty());
    }

    #[test]
    fn test_new_entrant_latest_week_is_not_a_mover() {
        // Dropped off and re-entered: rank_last_week 0 must not be used as "from"
        let history = HistoryTable::new(vec![
            row("2024-01-07", "BACK", 12, Some(0)),
            row("2024-01-21", "BACK", 3, Some(0)),
        ]);

        let engine = RecommendationEngine::new(&history);
        assert!(engine.fast_movers().is_empty());
        assert!(engine.sustained_momentum().is_empty());
    }

    #[test]
    fn test_first_week_appearance_does_not_make_a_mover() {
        let history = HistoryTable::new(vec![row("2024-01-07", "ONCE", 2, Some(9))]);
        assert!(RecommendationEngine::new(&history).fast_movers().is_empty());
    }

    #[test]
    fn test_fast_movers_tie_breaks() {
        let mut a = row("2024-01-14", "A", 4, Some(6));
        a.weeks_on_list = 2;
        let mut b = row("2024-01-14", "B", 4, Some(6));
        b.weeks_on_list = 9;
        let c = row("2024-01-14", "C", 2, Some(4));
        let d = row("2024-01-14", "D", 10, Some(15));

        let history = HistoryTable::new(vec![
            row("2024-01-07", "A", 6, Some(0)),
            row("2024-01-07", "B", 6, Some(0)),
            row("2024-01-07", "C", 4, Some(0)),
            row("2024-01-07", "D", 15, Some(0)),
            a,
            b,
            c,
            d,
        ]);

        let titles: Vec<String> = RecommendationEngine::new(&history)
            .fast_movers()
            .into_iter()
            .map(|r| r.title)
            .collect();

        // D: -5; C: -2 at rank 2; then A/B at -2 rank 4, longer tenure first
        assert_eq!(titles, vec!["D", "C", "B", "A"]);
    }

    #[test]
    fn test_fast_movers_fall_back_to_previous_row_without_field() {
        let history = HistoryTable::new(vec![
            row("2024-01-07", "OLD", 9, None),
            row("2024-01-14", "OLD", 4, None),
        ]);

        let movers = RecommendationEngine::new(&history).fast_movers();
        assert_eq!(movers.len(), 1);
        assert_eq!(movers[0].reason, "Rank improved by 5 vs last week (from #9 to #4).");
    }

    #[test]
    fn test_consistent_performers_filter_sort_and_reason() {
        let dates = weeks(6);
        let mut rows = Vec::new();
        for (i, date) in dates.iter().enumerate() {
            // STEADY: 6 weeks at rank 3
            rows.push(row(date, "STEADY", 3, Some(3)));
            // SHORT: 4 weeks only
            if i < 4 {
                rows.push(row(date, "SHORT", 1, Some(1)));
            }
            // LOW: 6 weeks around rank 12
            rows.push(row(date, "LOW", 12, Some(12)));
            // EVEN: 5 weeks at ranks 2,2,3,3,3 -> median 3, fewer weeks than STEADY
            if i < 5 {
                rows.push(row(date, "EVEN", if i < 2 { 2 } else { 3 }, Some(3)));
            }
        }
        let history = HistoryTable::new(rows);

        let performers = RecommendationEngine::new(&history).consistent_performers();
        let titles: Vec<&str> = performers.iter().map(|r| r.title.as_str()).collect();

        assert_eq!(titles, vec!["STEADY", "EVEN"]);
        assert_eq!(
            performers[0].reason,
            "Appeared on the bestseller list for 6 weeks with a median rank of #3."
        );
        assert_eq!(performers[0].author, "STEADY Author");
    }

    #[test]
    fn test_consistent_performers_mean_breaks_median_and_count_ties() {
        // Both: 5 weeks, median 4. AAA mean 6.0, ZZZ mean 2.8
        let aaa = [4, 4, 4, 9, 9];
        let zzz = [1, 1, 4, 4, 4];
        let mut rows = Vec::new();
        for (i, date) in weeks(5).iter().enumerate() {
            rows.push(row(date, "AAA", aaa[i], Some(aaa[i])));
            rows.push(row(date, "ZZZ", zzz[i], Some(zzz[i])));
        }
        let history = HistoryTable::new(rows);

        let performers = RecommendationEngine::new(&history).consistent_performers();
        let titles: Vec<&str> = performers.iter().map(|r| r.title.as_str()).collect();

        assert_eq!(titles, vec!["ZZZ", "AAA"]);
    }

    #[test]
    fn test_consistent_performers_capped_at_ten() {
        let mut rows = Vec::new();
        for date in weeks(5) {
            for n in 0..12 {
                rows.push(row(&date, &format!("T{:02}", n), 1 + n % 10, Some(1)));
            }
        }
        let history = HistoryTable::new(rows);

        let performers = RecommendationEngine::new(&history).consistent_performers();
        assert_eq!(performers.len(), 10);
        // Ranks ascend with the median; T00 and T10 share rank 1
        assert_eq!(performers[0].title, "T00");
        assert_eq!(performers[1].title, "T10");
    }

    #[test]
    fn test_sustained_momentum() {
        let history = HistoryTable::new(vec![
            row("2024-01-07", "CLIMB", 10, Some(0)),
            row("2024-01-14", "CLIMB", 7, Some(10)),
            row("2024-01-21", "CLIMB", 3, Some(7)),
            row("2024-01-07", "SLIDE", 2, Some(0)),
            row("2024-01-14", "SLIDE", 5, Some(2)),
            row("2024-01-21", "SLIDE", 8, Some(5)),
        ]);

        let rising = RecommendationEngine::new(&history).sustained_momentum();

        assert_eq!(rising.len(), 1);
        assert_eq!(rising[0].title, "CLIMB");
        assert_eq!(
            rising[0].reason,
            "Improved by 7 positions overall across 2 weeks (best rank #3)."
        );
        match &rising[0].metrics {
            CategoryMetrics::Momentum(m) => {
                assert_eq!(m.total_rank_change, -7);
                assert_eq!(m.avg_rank, 5.0);
            }
            other => panic!("unexpected metrics {:?}", other),
        }
    }

    #[test]
    fn test_sustained_momentum_sorted_and_capped() {
        let mut rows = Vec::new();
        for n in 0..12u32 {
            let title = format!("M{:02}", n);
            rows.push(row("2024-01-07", &title, 15, Some(0)));
            rows.push(row("2024-01-14", &title, 14, Some(15)));
            rows.push(row("2024-01-21", &title, 13 - n, Some(14)));
        }
        let history = HistoryTable::new(rows);

        let rising = RecommendationEngine::new(&history).sustained_momentum();
        assert_eq!(rising.len(), 10);
        assert_eq!(rising[0].title, "M11");
        assert_eq!(rising[9].title, "M02");
    }

    #[test]
    fn test_categories_concatenate_in_order() {
        let mut rows = Vec::new();
        for (i, date) in weeks(5).iter().enumerate() {
            rows.push(row(date, "STAR", 5 - i as u32, Some(6 - i as u32)));
        }
        let history = HistoryTable::new(rows);

        let table = build_recommendations(&history);
        let categories: Vec<Category> = table.rows().iter().map(|r| r.category).collect();

        assert_eq!(
            categories,
            vec![
                Category::FastMovers,
                Category::ConsistentPerformers,
                Category::SustainedMomentum
            ]
        );
    }

    #[tokio::test]
    async fn test_rebuild_without_history_writes_header_only() {
        let store = Arc::new(MemoryBlobStore::new());
        let service = RecommendationService::new(store.clone());

        let output = service.rebuild().await.unwrap();

        assert!(output.table.is_empty());
        let written = store.get(RECOMMENDATIONS_KEY).await.unwrap();
        assert_eq!(written.bytes, b"title,author,publisher,category,reason\n");
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_output() {
        let store = Arc::new(MemoryBlobStore::new());
        store
            .put(RECOMMENDATIONS_KEY, b"stale".to_vec(), Precondition::None)
            .await
            .unwrap();

        let history = HistoryTable::new(vec![
            row("2024-01-07", "RISING", 8, Some(0)),
            row("2024-01-14", "RISING", 5, Some(8)),
        ]);
        store
            .put(HISTORY_KEY, history.to_csv().unwrap(), Precondition::None)
            .await
            .unwrap();

        let service = RecommendationService::new(store.clone());
        let output = service.rebuild().await.unwrap();
        assert_eq!(output.table.len(), 1);

        let written = String::from_utf8(store.get(RECOMMENDATIONS_KEY).await.unwrap().bytes).unwrap();
        assert!(written.starts_with("title,author,publisher,published_date,"));
        assert!(written.contains("Rank improved by 3 vs last week (from #8 to #5)."));
        assert_eq!(service.current().await.unwrap(), output.table);
    }
}
