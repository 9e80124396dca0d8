pub mod decay;
pub mod knn;
pub mod loader;
pub mod mapper;
pub mod preprocess;
pub mod strategies;
pub mod writer;

pub use decay::{DecayEngine, NO_DECAY};
pub use knn::{NeighborLists, SimilarityEngine};
pub use mapper::{ItemCatalog, RecommendationMapper};
pub use preprocess::{AggregationOptions, DwellTimeMatrix};
pub use strategies::{generate_recommendations, Strategy, StrategyInput};
pub use writer::{
    InMemorySink, NdjsonFileSink, RecommendationSink, RecommendationWriter, WriterConfig,
};
