// ============================================
// Popularity (default recommendations)
// ============================================
//
// Scores recently published articles by time-per-visitor over the most recent
// interactions:
//
//   tpv   = total dwell seconds / distinct users
//   score = decay(published_at) * tpv / max(tpv)
//
// Only catalog items published inside the popularity window are eligible.
// The records have no source article; they are stored under "default".

use crate::error::{Result, TrainingError};
use crate::models::{Activity, ItemMetadata, ModelId, RecommendationRecord, DEFAULT_SOURCE_ENTITY_ID};
use crate::services::decay::DecayEngine;
use crate::services::mapper::ItemCatalog;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopularityParams {
    pub max_recs: usize,
    pub half_life_days: f64,
    pub popularity_window_days: i64,
    pub interaction_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopularItem<'a> {
    pub item: &'a ItemMetadata,
    pub time_per_visitor: f64,
    pub score: f64,
}

#[derive(Default)]
struct Engagement<'a> {
    dwell_seconds: f64,
    users: HashSet<&'a str>,
}

/// `reference_time - window_days`, or an error when that instant is not
/// representable.
pub fn window_start(reference_time: DateTime<Utc>, window_days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(window_days)
        .and_then(|window| reference_time.checked_sub_signed(window))
        .ok_or_else(|| {
            TrainingError::InvalidParameter(format!(
                "popularity window of {} days is out of range",
                window_days
            ))
        })
}

/// Ranked eligible items, best first, ties by external id.
pub fn popularity_scores<'a>(
    activities: &[Activity],
    catalog: &'a ItemCatalog,
    reference_time: DateTime<Utc>,
    params: &PopularityParams,
) -> Result<Vec<PopularItem<'a>>> {
    let earliest = window_start(reference_time, params.popularity_window_days)?;

    let mut recent: Vec<&Activity> = activities.iter().collect();
    recent.sort_by(|a, b| b.activity_time.cmp(&a.activity_time));
    recent.truncate(params.interaction_limit);

    let mut engagement: BTreeMap<&str, Engagement<'_>> = BTreeMap::new();
    for activity in &recent {
        let entry = engagement.entry(activity.external_id.as_str()).or_default();
        entry.dwell_seconds += activity.dwell_seconds;
        entry.users.insert(activity.user_id.as_str());
    }

    let eligible: Vec<(&ItemMetadata, f64)> = engagement
        .iter()
        .filter_map(|(external_id, engaged)| {
            let item = catalog.by_external_id(external_id)?;
            let in_window = item.published_at >= earliest && item.published_at <= reference_time;
            in_window.then(|| (item, engaged.dwell_seconds / engaged.users.len() as f64))
        })
        .collect();

    let max_tpv = eligible.iter().map(|(_, tpv)| *tpv).fold(0.0, f64::max);
    let decay = DecayEngine::new(params.half_life_days);

    let mut ranked: Vec<PopularItem<'a>> = eligible
        .into_iter()
        .map(|(item, tpv)| {
            let relative = if max_tpv > 0.0 { tpv / max_tpv } else { 0.0 };
            PopularItem {
                item,
                time_per_visitor: tpv,
                score: decay.factor(reference_time, item.published_at) * relative,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item.external_id.cmp(&b.item.external_id))
    });
    ranked.truncate(params.max_recs);

    info!(
        interactions = recent.len(),
        engaged_items = engagement.len(),
        ranked = ranked.len(),
        window_days = params.popularity_window_days,
        "Popularity scores computed"
    );

    Ok(ranked)
}

pub fn recommend(
    activities: &[Activity],
    catalog: &ItemCatalog,
    reference_time: DateTime<Utc>,
    params: &PopularityParams,
    model_id: ModelId,
) -> Result<Vec<RecommendationRecord>> {
    if activities.is_empty() {
        return Err(TrainingError::EmptyInput(
            "popularity needs at least one activity".to_string(),
        ));
    }

    let ranked = popularity_scores(activities, catalog, reference_time, params)?;
    if ranked.is_empty() {
        warn!(
            window_days = params.popularity_window_days,
            "No engaged article was published inside the popularity window"
        );
    }

    Ok(ranked
        .into_iter()
        .map(|popular| RecommendationRecord {
            source_entity_id: DEFAULT_SOURCE_ENTITY_ID.to_string(),
            recommended_article_id: popular.item.article_id,
            score: popular.score.max(0.0),
            model_id,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 8, 20, 12, 0, 0).unwrap()
    }

    fn item(index: usize, external_id: &str, age_days: i64) -> ItemMetadata {
        ItemMetadata {
            matrix_index: index,
            external_id: external_id.to_string(),
            article_id: 100 + index as i64,
            published_at: reference() - Duration::days(age_days),
        }
    }

    fn params() -> PopularityParams {
        PopularityParams {
            max_recs: 10,
            half_life_days: f64::INFINITY,
            popularity_window_days: 7,
            interaction_limit: 1000,
        }
    }

    fn seen(user: &str, external_id: &str, hours_ago: i64, dwell: f64) -> Activity {
        Activity::new(user, external_id, reference() - Duration::hours(hours_ago), dwell)
    }

    #[test]
    fn test_time_per_visitor_ranking() {
        let catalog = ItemCatalog::new(vec![item(0, "a", 1), item(1, "b", 2), item(2, "c", 3)]).unwrap();
        let activities = vec![
            // a: 200s over 2 users -> 100
            seen("u1", "a", 1, 150.0),
            seen("u2", "a", 2, 50.0),
            // b: 120s from one user -> 120
            seen("u1", "b", 3, 60.0),
            seen("u1", "b", 4, 60.0),
            // c: 60s -> 60
            seen("u3", "c", 5, 60.0),
        ];

        let ranked = popularity_scores(&activities, &catalog, reference(), &params()).unwrap();
        let order: Vec<&str> = ranked.iter().map(|p| p.item.external_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-12);
        assert!((ranked[1].time_per_visitor - 100.0).abs() < 1e-12);
        assert!((ranked[2].score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_window_and_catalog_filtering() {
        let catalog = ItemCatalog::new(vec![item(0, "fresh", 1), item(1, "stale", 30)]).unwrap();
        let activities = vec![
            seen("u1", "fresh", 1, 10.0),
            seen("u1", "stale", 1, 500.0),
            seen("u2", "not-an-article", 1, 900.0),
        ];

        let ranked = popularity_scores(&activities, &catalog, reference(), &params()).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.external_id, "fresh");
        assert!((ranked[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_only_most_recent_interactions_count() {
        let catalog = ItemCatalog::new(vec![item(0, "a", 1), item(1, "b", 1)]).unwrap();
        let activities = vec![seen("u1", "a", 1, 10.0), seen("u2", "b", 48, 600.0)];
        let limited = PopularityParams {
            interaction_limit: 1,
            ..params()
        };

        let ranked = popularity_scores(&activities, &catalog, reference(), &limited).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.external_id, "a");
    }

    #[test]
    fn test_decay_and_cap() {
        let catalog = ItemCatalog::new(vec![item(0, "old", 6), item(1, "new", 0), item(2, "mid", 3)]).unwrap();
        let activities = vec![
            seen("u1", "old", 1, 100.0),
            seen("u1", "new", 1, 100.0),
            seen("u1", "mid", 1, 100.0),
        ];
        let decayed = PopularityParams {
            max_recs: 2,
            half_life_days: 3.0,
            ..params()
        };

        let ranked = popularity_scores(&activities, &catalog, reference(), &decayed).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item.external_id, "new");
        assert!((ranked[1].score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ties_break_by_external_id() {
        let catalog = ItemCatalog::new(vec![item(0, "zeta", 1), item(1, "alpha", 1)]).unwrap();
        let activities = vec![seen("u1", "zeta", 1, 30.0), seen("u2", "alpha", 2, 30.0)];

        let ranked = popularity_scores(&activities, &catalog, reference(), &params()).unwrap();
        assert_eq!(ranked[0].item.external_id, "alpha");
        assert_eq!(ranked[1].item.external_id, "zeta");
    }

    #[test]
    fn test_unrepresentable_window_is_rejected() {
        let catalog = ItemCatalog::new(vec![item(0, "a", 1)]).unwrap();
        let activities = vec![seen("u1", "a", 1, 30.0)];

        // Too many days for a duration
        let huge = PopularityParams {
            popularity_window_days: 1_000_000_000_000_000,
            ..params()
        };
        let result = popularity_scores(&activities, &catalog, reference(), &huge);
        assert!(matches!(result, Err(TrainingError::InvalidParameter(_))));

        // A valid duration that reaches past the earliest representable date
        let before_calendar = PopularityParams {
            popularity_window_days: 1_000_000_000_000,
            ..params()
        };
        let result = recommend(&activities, &catalog, reference(), &before_calendar, ModelId::new());
        assert!(matches!(result, Err(TrainingError::InvalidParameter(_))));
    }

    #[test]
    fn test_recommend_requires_activity() {
        let catalog = ItemCatalog::new(vec![item(0, "a", 1)]).unwrap();
        let result = recommend(&[], &catalog, reference(), &params(), ModelId::new());
        assert!(matches!(result, Err(TrainingError::EmptyInput(_))));
    }
}
