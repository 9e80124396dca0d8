pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{Config, StrategyKind};
pub use error::{Result, TrainingError};
pub use jobs::{JobStats, TrainingJob};
pub use services::{
    generate_recommendations, DecayEngine, ItemCatalog, NeighborLists, RecommendationMapper,
    RecommendationSink, SimilarityEngine, Strategy, StrategyInput,
};
