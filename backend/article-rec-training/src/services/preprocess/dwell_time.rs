use crate::models::{Activity, EventKind, RawEvent};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Thresholds used to discard noisy activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityFilter {
    /// Activities longer than this (minutes) are treated as the reader walking away
    pub max_activity_minutes: f64,
    /// Users whose total dwell time is below this (minutes) are dropped
    pub min_dwell_minutes: f64,
}

impl Default for ActivityFilter {
    fn default() -> Self {
        Self {
            max_activity_minutes: 10.0,
            min_dwell_minutes: 1.0,
        }
    }
}

/// Attach a dwell time to every event.
///
/// `Other` events are not article reads and are discarded first. The rest
/// are ordered by (user, timestamp). An event's dwell time is the gap until
/// the same user's next event, so each user's last event has no dwell time
/// and is dropped.
pub fn time_activities(mut events: Vec<RawEvent>) -> Vec<Activity> {
    let received = events.len();
    events.retain(|event| event.event_kind != EventKind::Other);
    events.sort_by(|a, b| {
        a.user_id
            .cmp(&b.user_id)
            .then(a.event_timestamp.cmp(&b.event_timestamp))
    });

    let activities: Vec<Activity> = events
        .windows(2)
        .filter(|pair| pair[0].user_id == pair[1].user_id)
        .map(|pair| {
            let (event, next) = (&pair[0], &pair[1]);
            let gap = next.event_timestamp - event.event_timestamp;
            Activity {
                user_id: event.user_id.clone(),
                external_id: event.external_id.clone(),
                article_id: event.article_id,
                activity_time: event.event_timestamp,
                session_date: event.event_timestamp.date_naive(),
                dwell_seconds: gap.num_milliseconds() as f64 / 1000.0,
            }
        })
        .collect();

    info!(
        events = received,
        ignored = received - events.len(),
        activities = activities.len(),
        "Dwell times computed"
    );

    activities
}

/// Drop activities longer than `max_activity_minutes`, then drop every user
/// whose remaining dwell time adds up to less than `min_dwell_minutes`.
pub fn filter_activities(activities: Vec<Activity>, filter: &ActivityFilter) -> Vec<Activity> {
    let received = activities.len();
    let max_seconds = filter.max_activity_minutes * 60.0;
    let min_seconds = filter.min_dwell_minutes * 60.0;

    let bounded: Vec<Activity> = activities
        .into_iter()
        .filter(|activity| activity.dwell_seconds <= max_seconds)
        .collect();

    let mut dwell_per_user: HashMap<&str, f64> = HashMap::new();
    for activity in &bounded {
        *dwell_per_user.entry(activity.user_id.as_str()).or_insert(0.0) += activity.dwell_seconds;
    }
    let engaged: HashSet<String> = dwell_per_user
        .into_iter()
        .filter(|(_, total)| *total >= min_seconds)
        .map(|(user, _)| user.to_string())
        .collect();

    let kept: Vec<Activity> = bounded
        .into_iter()
        .filter(|activity| engaged.contains(&activity.user_id))
        .collect();

    info!(
        received,
        kept = kept.len(),
        users = engaged.len(),
        max_activity_minutes = filter.max_activity_minutes,
        min_dwell_minutes = filter.min_dwell_minutes,
        "Activities filtered"
    );

    kept
}
