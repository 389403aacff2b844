use serde_json::{json, Value as JsonValue};

use crate::models::feedback::FeedbackRequest;

const DEFAULT_STUDENT_NAME: &str = "Student";
const DEFAULT_TASK: &str = "Assignment";
const DEFAULT_NOTES: &str = "None";
const UNKNOWN_LEVEL_DESCRIPTION: &str = "Unknown";

/// System prompt for narrative rubric feedback.
pub fn feedback_system_prompt() -> &'static str {
    r#"You are an expert educational assistant. Write constructive, encouraging, and specific
feedback for a student based on rubric assessment data supplied as JSON in the user message.
Address the student directly in the second person. If a student self-reflection is present,
acknowledge it where relevant. Take any teacher notes into account.

Always respond with a single valid UTF-8 JSON object and nothing else. Do not wrap the response
in markdown code blocks. The object must have exactly these keys:
{
  "feedback": string,       // one cohesive paragraph summarizing the student's performance
  "strengths": string[],    // 2-3 key strengths
  "improvements": string[]  // 2-3 specific, actionable steps for improvement
}"#
}

/// User payload for a feedback request.
///
/// Only criteria with a non-zero selected score are included. Each entry
/// carries the matching level's label and description so the model sees
/// what the score means on this rubric.
pub fn build_feedback_payload(request: &FeedbackRequest) -> JsonValue {
    let assessment: Vec<JsonValue> = request
        .criteria
        .iter()
        .filter_map(|criterion| {
            let score = request.scores.get(&criterion.id).copied().unwrap_or(0);
            if score == 0 {
                return None;
            }
            let level = criterion.level_for_score(score);
            let level_label = level
                .map(|level| level.label.clone())
                .unwrap_or_else(|| score.to_string());
            let level_description = level
                .map(|level| level.description.clone())
                .unwrap_or_else(|| UNKNOWN_LEVEL_DESCRIPTION.to_string());

            Some(json!({
                "criterion": criterion.label,
                "score": score,
                "levelLabel": level_label,
                "levelDescription": level_description,
            }))
        })
        .collect();

    let mut payload = json!({
        "operation": "generateFeedback",
        "studentName": non_empty_or(&request.student_name, DEFAULT_STUDENT_NAME),
        "task": non_empty_or(&request.task, DEFAULT_TASK),
        "assessment": assessment,
        "notes": request
            .notes
            .as_deref()
            .map(|notes| non_empty_or(notes, DEFAULT_NOTES))
            .unwrap_or(DEFAULT_NOTES),
        "expectations": {
            "voice": "second-person",
            "strengthsCount": "2-3",
            "improvementsCount": "2-3",
        },
    });

    if let Some(reflection) = request
        .reflection
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        if let Some(map) = payload.as_object_mut() {
            map.insert("reflection".to_string(), json!(reflection));
        }
    }

    payload
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
