//! Reducers turning a group's answers into what a consumer asked for.
//!
//! Every reducer runs over the full current state of the group. Nothing is
//! accumulated incrementally, so repeated or reordered submissions always
//! produce the same result as a fresh pass.

use std::collections::BTreeMap;

use tracing::warn;

use clickerhub_protocol::{ConsumerDescriptor, ConsumerKind, QuestionSpec};

use crate::answers::{GroupAnswers, SlotAnswers};
use crate::error::AggregationError;

/// Key used for the tally in the nested value-map view.
pub const COUNT_KEY: &str = "Count";

/// Key used for each slot's mean in the nested value-map view.
pub const AVERAGE_KEY: &str = "Average";

/// A reduced view of one group's answers.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    /// The latest submitter's answers, unchanged.
    All {
        participant: String,
        answers: SlotAnswers,
    },
    /// Number of occurrences of each answer value.
    Count(BTreeMap<String, u32>),
    /// Mean of the numeric answers in each slot.
    Average(BTreeMap<usize, f64>),
}

impl AggregationResult {
    pub fn kind(&self) -> ConsumerKind {
        match self {
            Self::All { .. } => ConsumerKind::All,
            Self::Count(_) => ConsumerKind::Count,
            Self::Average(_) => ConsumerKind::Average,
        }
    }

    /// Nested string map: `participant -> slot -> value` for All,
    /// `"Count" -> value -> tally` for Count, `slot -> "Average" -> mean`
    /// for Average.
    pub fn to_value_map(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        match self {
            Self::All {
                participant,
                answers,
            } => {
                let inner = answers
                    .iter()
                    .map(|(slot, v)| (slot.to_string(), v.clone()))
                    .collect();
                out.insert(participant.clone(), inner);
            }
            Self::Count(tally) => {
                let inner = tally
                    .iter()
                    .map(|(value, n)| (value.clone(), n.to_string()))
                    .collect();
                out.insert(COUNT_KEY.to_string(), inner);
            }
            Self::Average(means) => {
                for (slot, mean) in means {
                    let inner = BTreeMap::from([(AVERAGE_KEY.to_string(), mean.to_string())]);
                    out.insert(slot.to_string(), inner);
                }
            }
        }
        out
    }
}

/// Reduces `answers` the way `descriptor` asks for.
///
/// Returns `None` only for [`ConsumerKind::All`] when nobody has answered.
pub fn reduce(
    descriptor: &ConsumerDescriptor,
    answers: &GroupAnswers,
    question: &QuestionSpec,
) -> Option<AggregationResult> {
    match descriptor.kind {
        ConsumerKind::All => reduce_all(answers),
        ConsumerKind::Count => Some(reduce_count(answers, question)),
        ConsumerKind::Average => Some(reduce_average(answers, descriptor.slot_limit())),
    }
}

/// Pass-through of the most recent submission.
pub fn reduce_all(answers: &GroupAnswers) -> Option<AggregationResult> {
    answers
        .latest()
        .map(|(participant, slots)| AggregationResult::All {
            participant: participant.to_string(),
            answers: slots.clone(),
        })
}

/// Tally of answer values across all participants and slots.
///
/// Every option the question's widgets can produce starts at zero so that
/// options nobody picked still show up. Blank values are not counted.
pub fn reduce_count(answers: &GroupAnswers, question: &QuestionSpec) -> AggregationResult {
    let mut tally: BTreeMap<String, u32> = question
        .enumerable_options()
        .into_iter()
        .map(|option| (option, 0))
        .collect();

    for (_, slots) in answers.iter() {
        for value in slots.values() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            *tally.entry(value.to_string()).or_insert(0) += 1;
        }
    }

    AggregationResult::Count(tally)
}

/// Per-slot mean of the answers that parse as numbers.
///
/// The divisor of a slot is the number of participants who gave a numeric
/// value for it. Non-numeric values are logged and skipped; blank values are
/// skipped silently. `slot_limit` restricts the result to slots below it.
pub fn reduce_average(answers: &GroupAnswers, slot_limit: Option<usize>) -> AggregationResult {
    let mut sums: BTreeMap<usize, (f64, u32)> = BTreeMap::new();

    for (participant, slots) in answers.iter() {
        for (&slot, value) in slots {
            if slot_limit.is_some_and(|limit| slot >= limit) || value.trim().is_empty() {
                continue;
            }
            match parse_numeric(participant, slot, value) {
                Ok(n) => {
                    let entry = sums.entry(slot).or_insert((0.0, 0));
                    entry.0 += n;
                    entry.1 += 1;
                }
                Err(e) => warn!("{e}, skipping"),
            }
        }
    }

    AggregationResult::Average(
        sums.into_iter()
            .map(|(slot, (sum, count))| (slot, sum / f64::from(count)))
            .collect(),
    )
}

fn parse_numeric(participant: &str, slot: usize, value: &str) -> Result<f64, AggregationError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| AggregationError::NonNumeric {
            participant: participant.to_string(),
            slot,
            value: value.to_string(),
        })
}
