use serde::{Deserialize, Serialize};

use crate::models::assessment::ScoreMap;
use crate::models::rubric::Criterion;

/// Everything the feedback provider needs to write narrative feedback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub student_name: String,
    pub task: String,
    pub scores: ScoreMap,
    pub criteria: Vec<Criterion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFeedback {
    pub feedback: String,
    pub strengths: String,
    pub improvements: String,
}

/// Providers return strengths and improvements either as one block or as a list of points.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TextOrPoints {
    Text(String),
    Points(Vec<String>),
}

impl Default for TextOrPoints {
    fn default() -> Self {
        TextOrPoints::Text(String::new())
    }
}

impl TextOrPoints {
    pub fn into_text(self) -> String {
        match self {
            TextOrPoints::Text(text) => text,
            TextOrPoints::Points(points) => points.join("\n"),
        }
    }
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FeedbackResponseDto {
    pub feedback: String,
    pub strengths: TextOrPoints,
    pub improvements: TextOrPoints,
}

impl From<FeedbackResponseDto> for GeneratedFeedback {
    fn from(dto: FeedbackResponseDto) -> Self {
        Self {
            feedback: dto.feedback,
            strengths: dto.strengths.into_text(),
            improvements: dto.improvements.into_text(),
        }
    }
}
