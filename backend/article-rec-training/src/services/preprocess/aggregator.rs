// ============================================
// Interaction Aggregator
// ============================================
//
// Pivots dwell-time activities into a dense matrix:
//
//   rows    = (user_id, session_date), sorted ascending
//   columns = item identifier, sorted ascending
//   cells   = summed dwell seconds, 0.0 where nothing happened
//
// Forced dates: for every date in `forced_dates`, zero-duration rows are
// injected so that every user and every item is present on that date. The
// cumulative decay step walks each user's date axis and needs those anchor
// rows even when nobody read anything on the reference date.

use crate::error::{Result, TrainingError};
use crate::models::Activity;
use chrono::{DateTime, NaiveDate, Utc};
use ndarray::{Array2, ArrayView2, Axis};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Which identifier of an activity names the matrix column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemColumn {
    #[default]
    ExternalId,
    ArticleId,
}

impl ItemColumn {
    fn key(&self, activity: &Activity) -> Option<String> {
        match self {
            ItemColumn::ExternalId => Some(activity.external_id.clone()),
            ItemColumn::ArticleId => activity.article_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregationOptions {
    pub item_column: ItemColumn,
    /// Dates that must appear for every user and every item
    pub forced_dates: Vec<NaiveDate>,
    /// Inclusive lower bound on activity time
    pub start_time: Option<DateTime<Utc>>,
    /// Exclusive upper bound on activity time
    pub end_time: Option<DateTime<Utc>>,
}

impl AggregationOptions {
    pub fn with_forced_dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.forced_dates = dates;
        self
    }

    fn in_window(&self, time: DateTime<Utc>) -> bool {
        self.start_time.map_or(true, |start| time >= start)
            && self.end_time.map_or(true, |end| time < end)
    }
}

/// Dense per-user-per-day-per-item matrix. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DwellTimeMatrix {
    rows: Vec<(String, NaiveDate)>,
    items: Vec<String>,
    values: Array2<f64>,
}

impl DwellTimeMatrix {
    pub fn new(
        rows: Vec<(String, NaiveDate)>,
        items: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != rows.len() {
            return Err(TrainingError::shape("dwell matrix rows", rows.len(), values.nrows()));
        }
        if values.ncols() != items.len() {
            return Err(TrainingError::shape("dwell matrix columns", items.len(), values.ncols()));
        }
        Ok(Self {
            rows,
            items,
            values,
        })
    }

    pub(crate) fn with_values(&self, values: Array2<f64>) -> Self {
        Self {
            rows: self.rows.clone(),
            items: self.items.clone(),
            values,
        }
    }

    pub fn rows(&self) -> &[(String, NaiveDate)] {
        &self.rows
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn has_row(&self, user_id: &str, date: NaiveDate) -> bool {
        self.row_index(user_id, date).is_some()
    }

    pub fn get(&self, user_id: &str, date: NaiveDate, item: &str) -> Option<f64> {
        let row = self.row_index(user_id, date)?;
        let col = self.items.binary_search_by(|candidate| candidate.as_str().cmp(item)).ok()?;
        Some(self.values[[row, col]])
    }

    /// Distinct session dates present on the row axis
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.iter().map(|(_, date)| *date).collect()
    }

    /// Column sums keyed by item
    pub fn item_totals(&self) -> Vec<(String, f64)> {
        let sums = self.values.sum_axis(Axis(0));
        self.items.iter().cloned().zip(sums.iter().copied()).collect()
    }

    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Row-oriented view for the external trainer.
    pub fn to_export(&self) -> DwellTimeExport {
        DwellTimeExport {
            items: self.items.clone(),
            rows: self
                .rows
                .iter()
                .zip(self.values.outer_iter())
                .map(|((user_id, session_date), values)| DwellTimeRow {
                    user_id: user_id.clone(),
                    session_date: *session_date,
                    values: values.to_vec(),
                })
                .collect(),
        }
    }

    fn row_index(&self, user_id: &str, date: NaiveDate) -> Option<usize> {
        self.rows
            .binary_search_by(|(u, d)| u.as_str().cmp(user_id).then(d.cmp(&date)))
            .ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DwellTimeExport {
    pub items: Vec<String>,
    pub rows: Vec<DwellTimeRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DwellTimeRow {
    pub user_id: String,
    pub session_date: NaiveDate,
    pub values: Vec<f64>,
}

/// Total dwell seconds per (user, day, item).
pub fn aggregate_time(activities: &[Activity], options: &AggregationOptions) -> Result<DwellTimeMatrix> {
    aggregate_with(activities, options, |activity| activity.dwell_seconds)
}

/// 1.0 where the user viewed the item on that day, 0.0 elsewhere.
pub fn aggregate_pageviews(
    activities: &[Activity],
    options: &AggregationOptions,
) -> Result<DwellTimeMatrix> {
    let counts = aggregate_with(activities, options, |_| 1.0)?;
    let viewed = counts.values.mapv(|count| if count > 0.0 { 1.0 } else { 0.0 });
    Ok(counts.with_values(viewed))
}

struct Cell {
    user_id: String,
    session_date: NaiveDate,
    item: String,
    value: f64,
}

fn aggregate_with<F>(
    activities: &[Activity],
    options: &AggregationOptions,
    value_of: F,
) -> Result<DwellTimeMatrix>
where
    F: Fn(&Activity) -> f64,
{
    if activities.is_empty() {
        return Err(TrainingError::EmptyInput(
            "no activities to aggregate".to_string(),
        ));
    }

    let keyed: Vec<(String, &Activity)> = activities
        .iter()
        .filter_map(|activity| options.item_column.key(activity).map(|key| (key, activity)))
        .collect();

    let (template_item, template_activity) = keyed.first().ok_or_else(|| {
        TrainingError::EmptyInput(format!(
            "no activity carries the {:?} identifier",
            options.item_column
        ))
    })?;
    let template_user = template_activity.user_id.clone();
    let template_item = template_item.clone();

    let items: BTreeSet<String> = keyed.iter().map(|(item, _)| item.clone()).collect();
    let users: BTreeSet<String> = keyed
        .iter()
        .map(|(_, activity)| activity.user_id.clone())
        .collect();

    let mut cells: Vec<Cell> = keyed
        .iter()
        .filter(|(_, activity)| options.in_window(activity.activity_time))
        .map(|(item, activity)| Cell {
            user_id: activity.user_id.clone(),
            session_date: activity.session_date,
            item: item.clone(),
            value: value_of(activity),
        })
        .collect();
    let observed = cells.len();

    for date in &options.forced_dates {
        cells.extend(items.iter().map(|item| Cell {
            user_id: template_user.clone(),
            session_date: *date,
            item: item.clone(),
            value: 0.0,
        }));
        cells.extend(users.iter().map(|user| Cell {
            user_id: user.clone(),
            session_date: *date,
            item: template_item.clone(),
            value: 0.0,
        }));
    }

    let rows: Vec<(String, NaiveDate)> = cells
        .iter()
        .map(|cell| (cell.user_id.clone(), cell.session_date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let items: Vec<String> = items.into_iter().collect();

    if rows.is_empty() {
        warn!(
            activities = activities.len(),
            "No activity inside the aggregation window and no forced dates"
        );
    }

    let row_lookup: HashMap<(&str, NaiveDate), usize> = rows
        .iter()
        .enumerate()
        .map(|(idx, (user, date))| ((user.as_str(), *date), idx))
        .collect();
    let col_lookup: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| (item.as_str(), idx))
        .collect();

    let mut values = Array2::<f64>::zeros((rows.len(), items.len()));
    for cell in &cells {
        let row = row_lookup[&(cell.user_id.as_str(), cell.session_date)];
        let col = col_lookup[cell.item.as_str()];
        values[[row, col]] += cell.value;
    }

    info!(
        activities = observed,
        injected = cells.len() - observed,
        rows = rows.len(),
        items = items.len(),
        forced_dates = options.forced_dates.len(),
        "Interactions aggregated"
    );

    DwellTimeMatrix::new(rows, items, values)
}
