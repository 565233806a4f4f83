use std::collections::{BTreeMap, HashMap};

/// One participant's answers, keyed by slot index.
pub type SlotAnswers = BTreeMap<usize, String>;

/// Accumulated answers of one open group.
///
/// Each participant has one value per slot. A resubmission overwrites the
/// participant's value for every slot it carries and leaves the other slots
/// untouched, so the map only ever grows while the group is open.
#[derive(Debug, Clone, Default)]
pub struct GroupAnswers {
    participants: HashMap<String, SlotAnswers>,
    latest: Option<String>,
}

impl GroupAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a submission and returns the participant's merged answers.
    pub fn record(&mut self, participant: &str, values: &[String]) -> &SlotAnswers {
        self.latest = Some(participant.to_string());
        let slots = self.participants.entry(participant.to_string()).or_default();
        for (slot, value) in values.iter().enumerate() {
            slots.insert(slot, value.clone());
        }
        slots
    }

    /// Answers of one participant.
    pub fn participant(&self, id: &str) -> Option<&SlotAnswers> {
        self.participants.get(id)
    }

    /// The most recent submitter and their answers.
    pub fn latest(&self) -> Option<(&str, &SlotAnswers)> {
        let id = self.latest.as_deref()?;
        self.participants.get(id).map(|answers| (id, answers))
    }

    /// Iterates over `(participant, answers)` in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotAnswers)> {
        self.participants.iter().map(|(id, a)| (id.as_str(), a))
    }

    /// Number of participants who have answered.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
