//! Answer aggregation for open groups.

pub mod answers;
pub mod error;
pub mod reduce;

pub use answers::{GroupAnswers, SlotAnswers};
pub use error::AggregationError;
pub use reduce::{AggregationResult, reduce, reduce_all, reduce_average, reduce_count};
