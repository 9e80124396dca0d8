/// Recommendation Writer
///
/// Persists a training run's recommendations through a [`RecommendationSink`].
///
/// # Workflow
/// 1. The job creates a model (not current) before generating records
/// 2. Records are written in fixed-size batches; each batch attempt is bounded
///    by a timeout and failed batches are retried with backoff
/// 3. Only when every batch landed is the model marked current, which makes
///    the previous model of the same type stale
pub mod file_sink;
pub mod memory_sink;

pub use file_sink::NdjsonFileSink;
pub use memory_sink::InMemorySink;

use crate::error::{Result, TrainingError};
use crate::models::{ModelId, ModelType, RecommendationRecord};
use async_trait::async_trait;
use resilience::{with_retry_if, with_timeout_result, RetryConfig, RetryError, TimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Persistence collaborator. Owns transactions and model lifecycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationSink: Send + Sync {
    /// Register a new model for this run. It starts out not current.
    async fn create_model(&self, model_type: ModelType) -> Result<ModelId>;

    async fn write_batch(&self, model_id: ModelId, records: Vec<RecommendationRecord>) -> Result<()>;

    /// Mark `model_id` current; other models of the same type become stale.
    async fn set_current_model(&self, model_id: ModelId, model_type: ModelType) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub retry: RetryConfig,
    pub timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveStats {
    pub records: usize,
    pub batches: usize,
}

pub struct RecommendationWriter {
    sink: Arc<dyn RecommendationSink>,
    config: WriterConfig,
}

impl RecommendationWriter {
    pub fn new(sink: Arc<dyn RecommendationSink>, config: WriterConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(TrainingError::InvalidParameter(
                "write batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self { sink, config })
    }

    pub async fn create_model(&self, model_type: ModelType) -> Result<ModelId> {
        let sink = self.sink.as_ref();
        let model_id = self
            .guarded("create model", move || sink.create_model(model_type))
            .await?;
        info!(model_id = %model_id, model_type = %model_type, "Model created");
        Ok(model_id)
    }

    /// Write every record, then mark the model current. Any batch that still
    /// fails after its retries aborts the save and the model stays stale.
    pub async fn save(
        &self,
        model_id: ModelId,
        model_type: ModelType,
        records: Vec<RecommendationRecord>,
    ) -> Result<SaveStats> {
        let start = Instant::now();
        let total_batches = (records.len() + self.config.batch_size - 1) / self.config.batch_size;
        let sink = self.sink.as_ref();

        for (batch_no, chunk) in records.chunks(self.config.batch_size).enumerate() {
            let batch = chunk.to_vec();
            self.guarded("write batch", move || sink.write_batch(model_id, batch.clone()))
                .await
                .map_err(|e| {
                    error!(
                        model_id = %model_id,
                        batch = batch_no + 1,
                        total_batches,
                        error = %e,
                        "Batch write failed, model left stale"
                    );
                    e
                })?;
            debug!(batch = batch_no + 1, total_batches, "Batch written");
        }

        self.guarded("set current model", move || {
            sink.set_current_model(model_id, model_type)
        })
        .await?;

        let stats = SaveStats {
            records: records.len(),
            batches: total_batches,
        };
        info!(
            model_id = %model_id,
            model_type = %model_type,
            records = stats.records,
            batches = stats.batches,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recommendations saved, model is current"
        );
        Ok(stats)
    }

    /// One sink call under the configured timeout and retry policy.
    async fn guarded<F, Fut, T>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let timeout = self.config.timeout;
        with_retry_if(
            self.config.retry.clone(),
            || with_timeout_result(timeout, call()),
            |e: &TimeoutError<TrainingError>| match e {
                TimeoutError::Elapsed(_) => true,
                TimeoutError::Failed(inner) => inner.is_transient(),
            },
        )
        .await
        .map_err(|e| sink_failure(operation, e))
    }
}

fn sink_failure(operation: &str, err: RetryError<TimeoutError<TrainingError>>) -> TrainingError {
    let attempts = err.attempts();
    match err.into_inner() {
        TimeoutError::Elapsed(after) => TrainingError::Sink(format!(
            "{} timed out after {:?} ({} attempt(s))",
            operation, after, attempts
        )),
        TimeoutError::Failed(TrainingError::Sink(msg)) => TrainingError::Sink(format!(
            "{} failed after {} attempt(s): {}",
            operation, attempts, msg
        )),
        TimeoutError::Failed(other) => other,
    }
}
