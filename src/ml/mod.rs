/// Sentiment inference module
///
/// This module contains:
/// - SentimentScorer, the seam the ranker scores reviews through
/// - SentimentModel, a lexicon model loaded from a JSON artifact
/// - ModelLoader for reading and verifying the artifact at startup

pub mod model_loader;
pub mod sentiment;


pub use model_loader::ModelLoader;
pub use sentiment::{ModelArtifact, SentimentModel, SentimentScorer};
