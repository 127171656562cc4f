pub mod cli;
pub mod config;
pub mod engine;
mod metrics;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod similarity;
pub mod upload;
pub mod utils;

pub use config::Opts;
pub use engine::{SharedEngine, SimilarityEngine};
pub use model::FeatureExtractor;
