/// Recommendation Mapper
///
/// Turns matrix indices back into article identifiers and emits scored
/// recommendation records.
///
/// # Rules
/// - A target with the same external id as its source is skipped (duplicate
///   articles can occupy several matrix rows)
/// - Scores are clamped to be non-negative
/// - At most `max_recs` records per source, in the engine's rank order
/// - An index the catalog cannot resolve fails the whole batch
use crate::error::{Result, TrainingError};
use crate::models::{ItemMetadata, ModelId, RecommendationRecord};
use crate::services::knn::NeighborLists;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

/// Item metadata aligned row-for-row with the embedding matrix.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: Vec<ItemMetadata>,
    by_external_id: HashMap<String, usize>,
}

impl ItemCatalog {
    pub fn new(items: Vec<ItemMetadata>) -> Result<Self> {
        if items.is_empty() {
            return Err(TrainingError::EmptyInput("item catalog is empty".to_string()));
        }

        if let Some((position, item)) = items
            .iter()
            .enumerate()
            .find(|(position, item)| item.matrix_index != *position)
        {
            return Err(TrainingError::Alignment(format!(
                "catalog row {} carries matrix_index {} (external_id {})",
                position, item.matrix_index, item.external_id
            )));
        }

        // First occurrence wins for duplicate external ids
        let mut by_external_id = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            by_external_id.entry(item.external_id.clone()).or_insert(position);
        }

        Ok(Self {
            items,
            by_external_id,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ItemMetadata] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&ItemMetadata> {
        self.items.get(index)
    }

    pub fn by_external_id(&self, external_id: &str) -> Option<&ItemMetadata> {
        self.by_external_id
            .get(external_id)
            .map(|position| &self.items[*position])
    }

    /// Like [`get`](Self::get), but a miss is an alignment violation.
    pub fn resolve(&self, index: usize) -> Result<&ItemMetadata> {
        self.items.get(index).ok_or_else(|| {
            TrainingError::Alignment(format!(
                "matrix index {} is outside the catalog ({} items)",
                index,
                self.items.len()
            ))
        })
    }

    /// The embedding matrix must have exactly one row per catalog item.
    pub fn check_rows(&self, rows: usize) -> Result<()> {
        if rows != self.items.len() {
            return Err(TrainingError::shape("embedding rows", self.items.len(), rows));
        }
        Ok(())
    }

    pub fn publish_dates(&self) -> Vec<DateTime<Utc>> {
        self.items.iter().map(|item| item.published_at).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecommendationMapper {
    max_recs: usize,
}

impl RecommendationMapper {
    pub fn new(max_recs: usize) -> Self {
        Self { max_recs }
    }

    pub fn map(
        &self,
        catalog: &ItemCatalog,
        neighbors: &NeighborLists,
        model_id: ModelId,
    ) -> Result<Vec<RecommendationRecord>> {
        if neighbors.n_items() != catalog.len() {
            return Err(TrainingError::shape(
                "neighbor lists",
                catalog.len(),
                neighbors.n_items(),
            ));
        }

        let mut records = Vec::with_capacity(catalog.len() * neighbors.k().min(self.max_recs));
        let mut skipped_duplicates = 0usize;

        for source_index in 0..neighbors.n_items() {
            let source = catalog.resolve(source_index)?;
            let mut emitted = 0usize;

            for (target_index, score) in neighbors.row(source_index) {
                if emitted == self.max_recs {
                    break;
                }
                let target = catalog.resolve(target_index)?;
                if target.external_id == source.external_id {
                    skipped_duplicates += 1;
                    continue;
                }

                records.push(RecommendationRecord {
                    source_entity_id: source.external_id.clone(),
                    recommended_article_id: target.article_id,
                    score: score.max(0.0),
                    model_id,
                });
                emitted += 1;
            }
        }

        info!(
            sources = catalog.len(),
            records = records.len(),
            skipped_duplicates,
            max_recs = self.max_recs,
            model_id = %model_id,
            "Neighbors mapped to recommendations"
        );

        Ok(records)
    }
}
