//! The classification pipeline: engine, result types, and session lifecycle.

pub mod engine;
pub mod result;
pub mod session;

pub use engine::InferenceEngine;
pub use result::{Candidate, ClassificationResult};
pub use session::{ClassificationSession, ClassifyOutcome, SessionStatus};
