/// Problems found in individual answer values during aggregation.
///
/// None of these abort an aggregation pass; the offending value is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("participant {participant} slot {slot}: {value:?} is not a number")]
    NonNumeric {
        participant: String,
        slot: usize,
        value: String,
    },
}
