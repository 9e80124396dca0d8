/// Preprocessing Module
///
/// Turns the fetched clickstream into training inputs.
///
/// # Workflow
/// 1. `dwell_time`: derive per-event dwell time from gaps between a user's events
/// 2. `dwell_time`: drop implausibly long activities and near-idle users
/// 3. `aggregator`: pivot into a dense (user, day) × item dwell-time matrix
pub mod aggregator;
pub mod dwell_time;

pub use aggregator::{
    aggregate_pageviews, aggregate_time, AggregationOptions, DwellTimeMatrix, ItemColumn,
};
pub use dwell_time::{filter_activities, time_activities, ActivityFilter};
