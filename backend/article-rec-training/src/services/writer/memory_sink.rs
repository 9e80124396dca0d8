use super::RecommendationSink;
use crate::error::{Result, TrainingError};
use crate::models::{ModelId, ModelRecord, ModelType, RecommendationRecord};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// Keeps everything in memory. Used for dry runs and tests.
#[derive(Debug)]
pub struct InMemorySink {
    site: String,
    models: RwLock<Vec<ModelRecord>>,
    records: RwLock<Vec<RecommendationRecord>>,
}

impl InMemorySink {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            models: RwLock::new(Vec::new()),
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn models(&self) -> Vec<ModelRecord> {
        self.models.read().await.clone()
    }

    pub async fn records(&self) -> Vec<RecommendationRecord> {
        self.records.read().await.clone()
    }

    pub async fn current_model(&self, model_type: ModelType) -> Option<ModelRecord> {
        self.models
            .read()
            .await
            .iter()
            .find(|m| m.model_type == model_type && m.current)
            .cloned()
    }
}

#[async_trait]
impl RecommendationSink for InMemorySink {
    async fn create_model(&self, model_type: ModelType) -> Result<ModelId> {
        let model = ModelRecord {
            id: ModelId::new(),
            model_type,
            site: self.site.clone(),
            created_at: Utc::now(),
            current: false,
        };
        let id = model.id;
        self.models.write().await.push(model);
        Ok(id)
    }

    async fn write_batch(&self, model_id: ModelId, records: Vec<RecommendationRecord>) -> Result<()> {
        if !self.models.read().await.iter().any(|m| m.id == model_id) {
            return Err(TrainingError::InvalidParameter(format!(
                "unknown model {}",
                model_id
            )));
        }
        self.records.write().await.extend(records);
        Ok(())
    }

    async fn set_current_model(&self, model_id: ModelId, model_type: ModelType) -> Result<()> {
        let mut models = self.models.write().await;
        if !models.iter().any(|m| m.id == model_id) {
            return Err(TrainingError::InvalidParameter(format!(
                "unknown model {}",
                model_id
            )));
        }
        for model in models.iter_mut().filter(|m| m.model_type == model_type) {
            model.current = model.id == model_id;
        }
        Ok(())
    }
}
