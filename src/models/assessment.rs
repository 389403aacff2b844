use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::rubric::ParsedRubric;

/// Selected score per criterion id. Not every criterion needs an entry.
pub type ScoreMap = BTreeMap<String, i64>;

/// The editable, unsaved side of an assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentState {
    pub student_name: String,
    pub date: String,
    pub task: String,
    pub scores: ScoreMap,
    pub feedback: String,
    pub strengths: String,
    pub improvements: String,
    pub student_reflection: String,
}

impl AssessmentState {
    pub fn blank(date: NaiveDate) -> Self {
        Self {
            student_name: String::new(),
            date: date.format("%Y-%m-%d").to_string(),
            task: String::new(),
            scores: ScoreMap::new(),
            feedback: String::new(),
            strengths: String::new(),
            improvements: String::new(),
            student_reflection: String::new(),
        }
    }
}

impl Default for AssessmentState {
    fn default() -> Self {
        Self::blank(Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub total_score: i64,
    pub max_score: i64,
    pub average_score: String,
}

/// A persisted assessment with its own copy of the rubric it was scored against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavedAssessment {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub student_name: String,
    pub date: String,
    pub task: String,
    pub rubric: ParsedRubric,
    pub scores: ScoreMap,
    pub feedback: String,
    pub strengths: String,
    pub improvements: String,
    pub total_score: i64,
    pub max_score: i64,
    pub average_score: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_reflection: Option<String>,
}
