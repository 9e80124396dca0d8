use super::RecommendationSink;
use crate::error::{Result, TrainingError};
use crate::models::{ModelId, ModelRecord, ModelType, RecommendationRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

pub const MODELS_FILE: &str = "models.ndjson";
pub const RECOMMENDATIONS_FILE: &str = "recommendations.ndjson";

/// Writes newline-delimited JSON into `output_dir`.
///
/// `recommendations.ndjson` grows one batch at a time. Each write first cuts
/// the file back to the end of the last completed batch, so a batch retried
/// after a failed or abandoned attempt is written exactly once.
/// `models.ndjson` holds one line per model and is rewritten whenever a
/// model's `current` flag changes.
#[derive(Debug)]
pub struct NdjsonFileSink {
    site: String,
    output_dir: PathBuf,
    models: Mutex<Vec<ModelRecord>>,
    /// Length of `recommendations.ndjson` after the last completed batch
    committed_len: Mutex<u64>,
}

impl NdjsonFileSink {
    /// Create the output directory and pick up models written by earlier runs.
    pub async fn open(output_dir: impl AsRef<Path>, site: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).await?;

        let models_path = output_dir.join(MODELS_FILE);
        let models = match fs::read_to_string(&models_path).await {
            Ok(contents) => contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line))
                .collect::<std::result::Result<Vec<ModelRecord>, _>>()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let committed_len = match fs::metadata(output_dir.join(RECOMMENDATIONS_FILE)).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        debug!(
            output_dir = %output_dir.display(),
            existing_models = models.len(),
            committed_len,
            "File sink opened"
        );

        Ok(Self {
            site: site.into(),
            output_dir,
            models: Mutex::new(models),
            committed_len: Mutex::new(committed_len),
        })
    }

    pub fn models_path(&self) -> PathBuf {
        self.output_dir.join(MODELS_FILE)
    }

    pub fn recommendations_path(&self) -> PathBuf {
        self.output_dir.join(RECOMMENDATIONS_FILE)
    }

    async fn persist_models(&self, models: &[ModelRecord]) -> Result<()> {
        let mut contents = String::new();
        for model in models {
            contents.push_str(&serde_json::to_string(model)?);
            contents.push('\n');
        }
        fs::write(self.models_path(), contents).await?;
        Ok(())
    }
}

#[async_trait]
impl RecommendationSink for NdjsonFileSink {
    async fn create_model(&self, model_type: ModelType) -> Result<ModelId> {
        let mut models = self.models.lock().await;
        let model = ModelRecord {
            id: ModelId::new(),
            model_type,
            site: self.site.clone(),
            created_at: Utc::now(),
            current: false,
        };
        let id = model.id;
        models.push(model);
        self.persist_models(&models).await?;
        Ok(id)
    }

    async fn write_batch(&self, model_id: ModelId, records: Vec<RecommendationRecord>) -> Result<()> {
        if !self.models.lock().await.iter().any(|m| m.id == model_id) {
            return Err(TrainingError::InvalidParameter(format!(
                "unknown model {}",
                model_id
            )));
        }

        let mut buffer = Vec::with_capacity(records.len() * 128);
        for record in &records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        // Held for the whole write; a dropped attempt releases it uncommitted
        let mut committed_len = self.committed_len.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.recommendations_path())
            .await?;
        file.set_len(*committed_len).await?;
        file.seek(SeekFrom::Start(*committed_len)).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;

        *committed_len += buffer.len() as u64;
        Ok(())
    }

    async fn set_current_model(&self, model_id: ModelId, model_type: ModelType) -> Result<()> {
        let mut models = self.models.lock().await;
        if !models.iter().any(|m| m.id == model_id) {
            return Err(TrainingError::InvalidParameter(format!(
                "unknown model {}",
                model_id
            )));
        }
        for model in models.iter_mut().filter(|m| m.model_type == model_type) {
            model.current = model.id == model_id;
        }
        self.persist_models(&models).await
    }
}
