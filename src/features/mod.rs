//! Feature alignment and transformation: raw record to the classifier's input row

pub mod aligner;
pub mod encoder;
pub mod scaler;
pub mod schema;

pub use aligner::{align, AlignedVector, AlignmentReport, NEUTRAL_FILL};
pub use encoder::{Encoder, EncoderSpec, EncodingStrategy};
pub use scaler::{Scaler, ScalerSpec};
pub use schema::{FeatureSchema, TrainedOrder};
