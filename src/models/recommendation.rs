use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Display;

use crate::error::{AppError, AppResult};

/// Columns every recommendation row carries
pub const BASE_COLUMNS: [&str; 5] = ["title", "author", "publisher", "category", "reason"];

/// The three independent recommendation derivations, in output order
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[serde(rename = "Fast Movers")]
    FastMovers,
    #[serde(rename = "Consistent Performers")]
    ConsistentPerformers,
    #[serde(rename = "Sustained Momentum")]
    SustainedMomentum,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::FastMovers,
        Category::ConsistentPerformers,
        Category::SustainedMomentum,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::FastMovers => "Fast Movers",
            Category::ConsistentPerformers => "Consistent Performers",
            Category::SustainedMomentum => "Sustained Momentum",
        }
    }

    /// Column layout of this category's rows, in output order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Category::FastMovers => &[
                "title",
                "author",
                "publisher",
                "published_date",
                "rank",
                "rank_last_week",
                "rank_change",
                "weeks_on_list",
                "total_appearances",
                "category",
                "reason",
            ],
            Category::ConsistentPerformers => &[
                "title",
                "author",
                "publisher",
                "total_appearances",
                "avg_rank",
                "median_rank",
                "max_weeks_on_list",
                "category",
                "reason",
            ],
            Category::SustainedMomentum => &[
                "title",
                "author",
                "publisher",
                "appearances",
                "avg_rank",
                "total_rank_change",
                "best_rank",
                "category",
                "reason",
            ],
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FastMoverMetrics {
    pub published_date: NaiveDate,
    pub rank: u32,
    /// The "from" rank the change was measured against
    pub rank_last_week: u32,
    pub rank_change: i64,
    pub weeks_on_list: u32,
    pub total_appearances: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsistentMetrics {
    pub total_appearances: usize,
    pub avg_rank: f64,
    pub median_rank: f64,
    pub max_weeks_on_list: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MomentumMetrics {
    pub appearances: usize,
    pub avg_rank: f64,
    pub total_rank_change: i64,
    pub best_rank: u32,
}

/// Category-specific numeric columns of a recommendation row
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CategoryMetrics {
    FastMover(FastMoverMetrics),
    Consistent(ConsistentMetrics),
    Momentum(MomentumMetrics),
}

impl CategoryMetrics {
    /// Value of a category column, `None` when the column does not apply
    fn cell(&self, column: &str) -> Option<String> {
        match self {
            CategoryMetrics::FastMover(m) => match column {
                "published_date" => Some(m.published_date.to_string()),
                "rank" => Some(m.rank.to_string()),
                "rank_last_week" => Some(m.rank_last_week.to_string()),
                "rank_change" => Some(m.rank_change.to_string()),
                "weeks_on_list" => Some(m.weeks_on_list.to_string()),
                "total_appearances" => Some(m.total_appearances.to_string()),
                _ => None,
            },
            CategoryMetrics::Consistent(m) => match column {
                "total_appearances" => Some(m.total_appearances.to_string()),
                "avg_rank" => Some(m.avg_rank.to_string()),
                "median_rank" => Some(m.median_rank.to_string()),
                "max_weeks_on_list" => Some(m.max_weeks_on_list.to_string()),
                _ => None,
            },
            CategoryMetrics::Momentum(m) => match column {
                "appearances" => Some(m.appearances.to_string()),
                "avg_rank" => Some(m.avg_rank.to_string()),
                "total_rank_change" => Some(m.total_rank_change.to_string()),
                "best_rank" => Some(m.best_rank.to_string()),
                _ => None,
            },
        }
    }
}

/// One ranked recommendation with its justification
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationRow {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub category: Category,
    pub reason: String,
    #[serde(flatten)]
    pub metrics: CategoryMetrics,
}

impl RecommendationRow {
    fn cell(&self, column: &str) -> String {
        match column {
            "title" => self.title.clone(),
            "author" => self.author.clone(),
            "publisher" => self.publisher.clone(),
            "category" => self.category.label().to_string(),
            "reason" => self.reason.clone(),
            other => self.metrics.cell(other).unwrap_or_default(),
        }
    }
}

/// Union of all category outputs, rebuilt in full on every run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct RecommendationTable {
    rows: Vec<RecommendationRow>,
}

impl RecommendationTable {
    pub fn new(rows: Vec<RecommendationRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[RecommendationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &RecommendationRow> {
        self.rows.iter().filter(move |row| row.category == category)
    }

    /// Columns of the present categories, in first-appearance order
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = Vec::new();

        for category in Category::ALL {
            if self.by_category(category).next().is_none() {
                continue;
            }
            for column in category.columns() {
                if !columns.contains(column) {
                    columns.push(column);
                }
            }
        }

        if columns.is_empty() {
            columns.extend(BASE_COLUMNS);
        }
        columns
    }

    /// Serializes the table; cells outside a row's category are left empty
    pub fn to_csv(&self) -> AppResult<Vec<u8>> {
        let columns = self.columns();
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record(&columns)?;
        for row in &self.rows {
            writer.write_record(columns.iter().map(|column| row.cell(column)))?;
        }

        writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV flush failed: {}", e)))
    }
}
