//! Pipeline stages: normalize, classify, persist

pub mod classification_engine;
pub mod heuristics;
pub mod inference_client;
pub mod normalizer;
pub mod persistence_gateway;

pub use classification_engine::{ClassificationEngine, ClassificationSource};
pub use heuristics::HeuristicRules;
pub use inference_client::{HuggingFaceClient, InferenceClient, InferenceError};
pub use normalizer::{NormalizeError, NormalizedEvent, Normalizer, Rejection};
pub use persistence_gateway::{PersistenceGateway, StoreOutcome};
