/// Recommendation Strategies
///
/// One variant per strategy, each carrying only the parameters it uses.
/// [`generate_recommendations`] dispatches on the variant.
///
/// # Strategies
/// - `Popularity`: default recommendations for pages without a source article
/// - `CollaborativeFiltering`: neighbors in the trained item-embedding space,
///   weighted by how recently the candidate was published
/// - `SemanticSimilarity`: neighbors in the text-embedding space, no decay
pub mod popularity;
pub mod similarity;

use crate::config::{Config, StrategyKind};
use crate::error::{Result, TrainingError};
use crate::models::{Activity, ModelId, ModelType, RecommendationRecord};
use crate::services::mapper::ItemCatalog;
use crate::utils::timed;
use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use tracing::info;

pub use popularity::{popularity_scores, window_start, PopularItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Popularity {
        max_recs: usize,
        half_life_days: f64,
        popularity_window_days: i64,
        interaction_limit: usize,
    },
    CollaborativeFiltering {
        half_life_days: f64,
        max_recs: usize,
        batch_size: usize,
    },
    SemanticSimilarity {
        max_recs: usize,
        batch_size: usize,
    },
}

impl Strategy {
    pub fn from_config(config: &Config) -> Self {
        match config.strategy {
            StrategyKind::Popularity => Strategy::Popularity {
                max_recs: config.max_recs,
                half_life_days: config.half_life_days,
                popularity_window_days: config.popularity_window_days,
                interaction_limit: config.popular_interaction_limit,
            },
            StrategyKind::CollaborativeFiltering => Strategy::CollaborativeFiltering {
                half_life_days: config.half_life_days,
                max_recs: config.max_recs,
                batch_size: config.knn_batch_size,
            },
            StrategyKind::SemanticSimilarity => Strategy::SemanticSimilarity {
                max_recs: config.max_recs,
                batch_size: config.knn_batch_size,
            },
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Strategy::Popularity { .. } => ModelType::Popularity,
            Strategy::CollaborativeFiltering { .. } => ModelType::Article,
            Strategy::SemanticSimilarity { .. } => ModelType::SemanticSimilarity,
        }
    }

    pub fn needs_embeddings(&self) -> bool {
        !matches!(self, Strategy::Popularity { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Popularity { .. } => "popularity",
            Strategy::CollaborativeFiltering { .. } => "collaborative_filtering",
            Strategy::SemanticSimilarity { .. } => "semantic_similarity",
        }
    }
}

/// Everything a strategy may read. Embeddings are only required by the
/// neighbor-based strategies.
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    pub embeddings: Option<ArrayView2<'a, f64>>,
    pub catalog: &'a ItemCatalog,
    pub activities: &'a [Activity],
    pub reference_time: DateTime<Utc>,
}

impl<'a> StrategyInput<'a> {
    fn require_embeddings(&self, strategy: &Strategy) -> Result<ArrayView2<'a, f64>> {
        self.embeddings.ok_or_else(|| {
            TrainingError::InvalidParameter(format!(
                "strategy {} requires an embedding matrix",
                strategy.name()
            ))
        })
    }
}

pub fn generate_recommendations(
    strategy: &Strategy,
    input: &StrategyInput<'_>,
    model_id: ModelId,
) -> Result<Vec<RecommendationRecord>> {
    let (elapsed, records) = timed(|| match strategy {
        Strategy::Popularity {
            max_recs,
            half_life_days,
            popularity_window_days,
            interaction_limit,
        } => popularity::recommend(
            input.activities,
            input.catalog,
            input.reference_time,
            &popularity::PopularityParams {
                max_recs: *max_recs,
                half_life_days: *half_life_days,
                popularity_window_days: *popularity_window_days,
                interaction_limit: *interaction_limit,
            },
            model_id,
        ),
        Strategy::CollaborativeFiltering {
            half_life_days,
            max_recs,
            batch_size,
        } => {
            let embeddings = input.require_embeddings(strategy)?;
            let decay = similarity::publish_decay(input.catalog, input.reference_time, *half_life_days);
            similarity::recommend(embeddings, input.catalog, decay, *max_recs, *batch_size, model_id)
        }
        Strategy::SemanticSimilarity {
            max_recs,
            batch_size,
        } => {
            let embeddings = input.require_embeddings(strategy)?;
            let decay = similarity::no_decay(input.catalog);
            similarity::recommend(embeddings, input.catalog, decay, *max_recs, *batch_size, model_id)
        }
    });
    let records = records?;

    info!(
        strategy = strategy.name(),
        model_type = %strategy.model_type(),
        records = records.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Recommendations generated"
    );

    Ok(records)
}
