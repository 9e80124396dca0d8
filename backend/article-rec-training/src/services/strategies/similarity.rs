use crate::error::Result;
use crate::models::{ModelId, RecommendationRecord};
use crate::services::decay::DecayEngine;
use crate::services::knn::{l2_normalize, SimilarityEngine};
use crate::services::mapper::{ItemCatalog, RecommendationMapper};
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView2};
use tracing::debug;

/// Candidate weights from each item's publish date.
pub fn publish_decay(
    catalog: &ItemCatalog,
    reference_time: DateTime<Utc>,
    half_life_days: f64,
) -> Array1<f64> {
    DecayEngine::new(half_life_days).factors(reference_time, &catalog.publish_dates())
}

pub fn no_decay(catalog: &ItemCatalog) -> Array1<f64> {
    Array1::ones(catalog.len())
}

/// Normalise, find `max_recs` neighbors per item (plus the self match the
/// engine drops), and map them to records.
pub fn recommend(
    embeddings: ArrayView2<'_, f64>,
    catalog: &ItemCatalog,
    decay: Array1<f64>,
    max_recs: usize,
    batch_size: usize,
    model_id: ModelId,
) -> Result<Vec<RecommendationRecord>> {
    catalog.check_rows(embeddings.nrows())?;

    let normalized = l2_normalize(embeddings);
    debug!(
        items = normalized.nrows(),
        dimensions = normalized.ncols(),
        "Embeddings normalized"
    );

    let neighbors = SimilarityEngine::batched(batch_size)?.nearest_neighbors(
        normalized.view(),
        decay.view(),
        max_recs + 1,
    )?;

    RecommendationMapper::new(max_recs).map(catalog, &neighbors, model_id)
}
