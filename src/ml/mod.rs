//! Machine learning building blocks: the forest learner, evaluation metrics
//! and model persistence.

pub mod forest;
pub mod metrics;
pub mod persist;
