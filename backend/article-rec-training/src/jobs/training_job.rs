// ============================================
// Training Job
// ============================================
//
// One run for one site and one strategy:
//
// 1. Load events, the item catalog and (for neighbor strategies) embeddings
// 2. Derive dwell times and drop noise
// 3. Aggregate into the (user, day) × item matrix with the execution date
//    forced, roll it forward with cumulative decay, optionally export it
// 4. Create the model, generate recommendations, save them
//
// Input-shape and alignment failures abort the run before the model is
// marked current, so the previous model keeps serving.

use crate::config::Config;
use crate::error::{Result, TrainingError};
use crate::models::{ModelId, ModelType, RawEvent};
use crate::services::decay::DecayEngine;
use crate::services::loader::{load_catalog, load_embeddings, load_events, write_dwell_matrix};
use crate::services::mapper::ItemCatalog;
use crate::services::preprocess::{
    aggregate_time, filter_activities, time_activities, AggregationOptions, DwellTimeMatrix,
};
use crate::services::strategies::{generate_recommendations, Strategy, StrategyInput};
use crate::services::writer::{InMemorySink, NdjsonFileSink, RecommendationSink, RecommendationWriter};
use crate::utils::timed;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    pub load: Duration,
    pub preprocess: Duration,
    pub aggregate: Duration,
    pub recommend: Duration,
    pub save: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.load + self.preprocess + self.aggregate + self.recommend + self.save
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStats {
    pub model_id: ModelId,
    pub model_type: ModelType,
    pub reference_time: DateTime<Utc>,
    pub events: usize,
    pub activities: usize,
    pub matrix_rows: usize,
    pub matrix_items: usize,
    pub catalog_items: usize,
    pub recommendations: usize,
    pub batches: usize,
    pub timings: StageTimings,
}

type LoadedInputs = (Vec<RawEvent>, ItemCatalog, Option<Array2<f64>>);

pub struct TrainingJob {
    config: Config,
    sink: Arc<dyn RecommendationSink>,
}

impl TrainingJob {
    pub fn new(config: Config, sink: Arc<dyn RecommendationSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self) -> Result<JobStats> {
        let config = &self.config;
        let reference_time = config.reference_time();
        let strategy = Strategy::from_config(config);
        let mut timings = StageTimings::default();

        info!(
            site = %config.site,
            strategy = strategy.name(),
            reference_time = %reference_time,
            half_life_days = config.half_life_days,
            max_recs = config.max_recs,
            max_article_age_years = config.max_article_age_years,
            "Starting training job"
        );

        let (elapsed, loaded) = timed(|| self.load_inputs(&strategy));
        timings.load = elapsed;
        let (events, catalog, embeddings) = loaded?;
        let n_events = events.len();

        let (elapsed, activities) =
            timed(|| filter_activities(time_activities(events), &config.activity_filter()));
        timings.preprocess = elapsed;

        let (elapsed, matrix) = timed(|| -> Result<DwellTimeMatrix> {
            let options =
                AggregationOptions::default().with_forced_dates(vec![reference_time.date_naive()]);
            let matrix = aggregate_time(&activities, &options)?;
            Ok(DecayEngine::new(config.half_life_days).cumulative(&matrix))
        });
        timings.aggregate = elapsed;
        let matrix = matrix?;
        if let Some(path) = &config.dwell_matrix_path {
            write_dwell_matrix(path, &matrix)?;
        }

        let writer = RecommendationWriter::new(self.sink.clone(), config.writer_config())?;
        let model_type = strategy.model_type();
        let model_id = writer.create_model(model_type).await?;

        let input = StrategyInput {
            embeddings: embeddings.as_ref().map(|e| e.view()),
            catalog: &catalog,
            activities: &activities,
            reference_time,
        };
        let (elapsed, records) = timed(|| generate_recommendations(&strategy, &input, model_id));
        timings.recommend = elapsed;
        let records = records?;
        let n_records = records.len();
        if n_records == 0 {
            warn!(model_id = %model_id, "Strategy produced no recommendations");
        }

        let save_start = Instant::now();
        let saved = writer.save(model_id, model_type, records).await?;
        timings.save = save_start.elapsed();

        let stats = JobStats {
            model_id,
            model_type,
            reference_time,
            events: n_events,
            activities: activities.len(),
            matrix_rows: matrix.n_rows(),
            matrix_items: matrix.items().len(),
            catalog_items: catalog.len(),
            recommendations: n_records,
            batches: saved.batches,
            timings,
        };

        info!(
            site = %config.site,
            model_id = %stats.model_id,
            model_type = %stats.model_type,
            events = stats.events,
            activities = stats.activities,
            matrix_rows = stats.matrix_rows,
            recommendations = stats.recommendations,
            load_ms = stats.timings.load.as_millis() as u64,
            preprocess_ms = stats.timings.preprocess.as_millis() as u64,
            aggregate_ms = stats.timings.aggregate.as_millis() as u64,
            recommend_ms = stats.timings.recommend.as_millis() as u64,
            save_ms = stats.timings.save.as_millis() as u64,
            total_ms = stats.timings.total().as_millis() as u64,
            "Training job completed"
        );

        Ok(stats)
    }

    fn load_inputs(&self, strategy: &Strategy) -> Result<LoadedInputs> {
        let events = load_events(&self.config.events_path)?;
        let catalog = ItemCatalog::new(load_catalog(&self.config.catalog_path)?)?;

        let embeddings = if strategy.needs_embeddings() {
            let path = self.config.embeddings_path.as_ref().ok_or_else(|| {
                TrainingError::Config(format!("{} needs an embeddings path", strategy.name()))
            })?;
            let embeddings = load_embeddings(path)?;
            catalog.check_rows(embeddings.nrows())?;
            Some(embeddings)
        } else {
            None
        };

        Ok((events, catalog, embeddings))
    }
}

/// Build the sink the configuration asks for and run once.
pub async fn run_training_job(config: Config) -> Result<JobStats> {
    let sink: Arc<dyn RecommendationSink> = if config.dry_run {
        info!("Dry run, recommendations stay in memory");
        Arc::new(InMemorySink::new(config.site.clone()))
    } else {
        Arc::new(NdjsonFileSink::open(&config.output_dir, config.site.clone()).await?)
    };

    TrainingJob::new(config, sink).run().await
}
