//! Fraud Scoring Service Library
//!
//! Turns raw transaction records into the exact feature row a trained
//! classifier expects, scores it and applies the decision threshold.

pub mod artifacts;
pub mod config;
pub mod consumer;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod producer;
pub mod types;

pub use artifacts::{ArtifactLoader, Artifacts};
pub use config::AppConfig;
pub use consumer::ScoreConsumer;
pub use error::{ArtifactError, PredictError};
pub use pipeline::ScoringPipeline;
pub use producer::ReplyPublisher;
pub use types::{Decision, RawRecord};
