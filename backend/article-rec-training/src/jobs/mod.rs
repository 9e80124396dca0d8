// ============================================
// Jobs Module
// ============================================
//
// Batch entry points. The training job runs once per invocation and is meant
// to be scheduled externally (CronJob or similar), one run per site and
// strategy.

pub mod training_job;

pub use training_job::{run_training_job, JobStats, StageTimings, TrainingJob};
