//! Classifier inference components

pub mod classifier;
pub mod inference;
pub mod loader;

pub use classifier::{Classifier, ClassifierSpec, LogisticClassifier, LogisticSpec};
pub use inference::OnnxClassifier;
pub use loader::ModelLoader;
