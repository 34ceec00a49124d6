//! Type definitions for the fraud scoring service

pub mod decision;
pub mod record;
pub mod reply;

pub use decision::Decision;
pub use record::{FieldValue, RawRecord};
pub use reply::{BatchReply, ErrorReply, ScoreReply};
