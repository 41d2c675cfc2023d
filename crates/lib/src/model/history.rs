//! Assessment history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{clock::Timestamp, constants::ASSESSMENT_HISTORY_LIMIT};

/// Immutable snapshot of one completed eligibility assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub id: String,
    pub date: Timestamp,
    pub eligible: bool,
    pub recommended_path: String,
    pub score_estimate: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AssessmentRecord {
    /// Create a record with a fresh random id.
    pub fn new(
        date: Timestamp,
        eligible: bool,
        recommended_path: impl Into<String>,
        score_estimate: Option<u32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date,
            eligible,
            recommended_path: recommended_path.into(),
            score_estimate,
            tags: Vec::new(),
        }
    }

    /// Attach tags to the record.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Newest-first list of assessments, never longer than
/// [`ASSESSMENT_HISTORY_LIMIT`].
///
/// Inserting into a full history evicts the oldest entries. Over-long lists
/// coming from storage are truncated the same way when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AssessmentRecord>", into = "Vec<AssessmentRecord>")]
pub struct AssessmentHistory {
    records: Vec<AssessmentRecord>,
}

impl AssessmentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record at the front, returning whatever fell off the end.
    pub fn push(&mut self, record: AssessmentRecord) -> Vec<AssessmentRecord> {
        self.records.insert(0, record);
        if self.records.len() > ASSESSMENT_HISTORY_LIMIT {
            self.records.split_off(ASSESSMENT_HISTORY_LIMIT)
        } else {
            Vec::new()
        }
    }

    /// A copy of this history with `record` inserted at the front.
    pub fn with_record(&self, record: AssessmentRecord) -> Self {
        let mut next = self.clone();
        next.push(record);
        next
    }

    /// The most recent record.
    pub fn latest(&self) -> Option<&AssessmentRecord> {
        self.records.first()
    }

    pub fn get(&self, id: &str) -> Option<&AssessmentRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssessmentRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[AssessmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<AssessmentRecord>> for AssessmentHistory {
    fn from(mut records: Vec<AssessmentRecord>) -> Self {
        records.truncate(ASSESSMENT_HISTORY_LIMIT);
        Self { records }
    }
}

impl From<AssessmentHistory> for Vec<AssessmentRecord> {
    fn from(history: AssessmentHistory) -> Self {
        history.records
    }
}
