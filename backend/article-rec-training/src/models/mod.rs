use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Source entity used for recommendations that do not depend on a source
/// article (popularity defaults).
pub const DEFAULT_SOURCE_ENTITY_ID: &str = "default";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    PageView,
    PagePing,
    Engagement,
    Other,
}

/// One clickstream event as handed over by the event fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    pub user_id: String,
    pub external_id: String,
    #[serde(default)]
    pub article_id: Option<i64>,
    pub event_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub event_kind: EventKind,
}

/// An event with its dwell time attached. Input to the interaction aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub user_id: String,
    pub external_id: String,
    pub article_id: Option<i64>,
    pub activity_time: DateTime<Utc>,
    pub session_date: NaiveDate,
    pub dwell_seconds: f64,
}

impl Activity {
    pub fn new(
        user_id: impl Into<String>,
        external_id: impl Into<String>,
        activity_time: DateTime<Utc>,
        dwell_seconds: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            external_id: external_id.into(),
            article_id: None,
            activity_time,
            session_date: activity_time.date_naive(),
            dwell_seconds,
        }
    }

    pub fn with_article_id(mut self, article_id: i64) -> Self {
        self.article_id = Some(article_id);
        self
    }
}

/// Row `matrix_index` of the embedding matrix describes this article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemMetadata {
    pub matrix_index: usize,
    pub external_id: String,
    pub article_id: i64,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Article,
    SemanticSimilarity,
    Popularity,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Article => "article",
            ModelType::SemanticSimilarity => "semantic_similarity",
            ModelType::Popularity => "popularity",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ModelId(pub Uuid);

impl ModelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A scored (source, target) pair ready for the persistence collaborator.
/// Never edited after creation; a new model supersedes the whole set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRecord {
    pub source_entity_id: String,
    pub recommended_article_id: i64,
    pub score: f64,
    pub model_id: ModelId,
}

/// Model lifecycle row written by the sinks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRecord {
    pub id: ModelId,
    pub model_type: ModelType,
    pub site: String,
    pub created_at: DateTime<Utc>,
    pub current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_activity_session_date_follows_timestamp() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 23, 59, 0).unwrap();
        let activity = Activity::new("u1", "a1", ts, 12.0).with_article_id(7);

        assert_eq!(activity.session_date, NaiveDate::from_ymd_opt(2021, 3, 4).unwrap());
        assert_eq!(activity.article_id, Some(7));
    }

    #[test]
    fn test_raw_event_defaults() {
        let json = r#"{"user_id":"u","external_id":"x","event_timestamp":"2021-01-01T00:00:00Z"}"#;
        let event: RawEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_kind, EventKind::PageView);
        assert_eq!(event.article_id, None);
    }

    #[test]
    fn test_model_type_as_str() {
        assert_eq!(ModelType::Article.as_str(), "article");
        assert_eq!(ModelType::SemanticSimilarity.to_string(), "semantic_similarity");
        assert_eq!(ModelType::Popularity.as_str(), "popularity");
    }
}
