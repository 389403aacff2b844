//! The in-progress assessment: a live rubric, the teacher's selections and
//! the narrative feedback for one student.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::assessment::{AssessmentState, SavedAssessment, ScoreSummary};
use crate::models::feedback::{FeedbackRequest, GeneratedFeedback};
use crate::models::rubric::{Criterion, Level, ParsedRubric, Sheet};
use crate::services::feedback_service::FeedbackProvider;
use crate::services::history_service::AssessmentHistoryService;
use crate::services::rubric_parser::parse_rubric_sheet;
use crate::services::score_service;

const NEW_CRITERION_LABEL: &str = "New Criterion";
const DEFAULT_LEVEL_LABELS: [&str; 3] = ["Needs Work (1)", "Developing (2)", "Exceeds (3)"];

#[derive(Debug, Clone)]
pub struct AssessmentSession {
    rubric: ParsedRubric,
    state: AssessmentState,
    current_id: Option<String>,
    self_assessment_enabled: bool,
    feedback_in_flight: bool,
}

impl AssessmentSession {
    pub fn from_sheet(sheet: &Sheet) -> Self {
        Self::from_rubric(parse_rubric_sheet(sheet))
    }

    pub fn from_rubric(rubric: ParsedRubric) -> Self {
        Self {
            rubric,
            state: AssessmentState::default(),
            current_id: None,
            self_assessment_enabled: false,
            feedback_in_flight: false,
        }
    }

    /// Reopens a saved assessment for editing. Saving again replaces it.
    pub fn from_saved(record: &SavedAssessment) -> Self {
        let reflection = record.student_reflection.clone().unwrap_or_default();
        let self_assessment_enabled = !reflection.is_empty();

        Self {
            rubric: record.rubric.clone(),
            state: AssessmentState {
                student_name: record.student_name.clone(),
                date: record.date.clone(),
                task: record.task.clone(),
                scores: record.scores.clone(),
                feedback: record.feedback.clone(),
                strengths: record.strengths.clone(),
                improvements: record.improvements.clone(),
                student_reflection: reflection,
            },
            current_id: Some(record.id.clone()),
            self_assessment_enabled,
            feedback_in_flight: false,
        }
    }

    pub fn rubric(&self) -> &ParsedRubric {
        &self.rubric
    }

    pub fn state(&self) -> &AssessmentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AssessmentState {
        &mut self.state
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn self_assessment_enabled(&self) -> bool {
        self.self_assessment_enabled
    }

    pub fn set_self_assessment_enabled(&mut self, enabled: bool) {
        self.self_assessment_enabled = enabled;
    }

    pub fn feedback_in_flight(&self) -> bool {
        self.feedback_in_flight
    }

    pub fn set_score(&mut self, criterion_id: &str, score: i64) -> AppResult<()> {
        let criterion = self.rubric.criterion(criterion_id).ok_or_else(|| {
            AppError::validation(format!("Unknown criterion: {criterion_id}"))
        })?;

        if criterion.level_for_score(score).is_none() {
            return Err(AppError::validation(format!(
                "Criterion \"{}\" has no level scored {score}",
                criterion.label
            )));
        }

        self.state.scores.insert(criterion_id.to_string(), score);
        Ok(())
    }

    /// Drops the scores, the generated feedback and the reflection. The rubric,
    /// the student details and the saved record id are kept.
    pub fn reset_scores(&mut self) {
        self.state.scores.clear();
        self.state.feedback.clear();
        self.state.strengths.clear();
        self.state.improvements.clear();
        self.state.student_reflection.clear();
        debug!(target: "app::rubric", "scores reset");
    }

    pub fn rename_title(&mut self, title: impl Into<String>) {
        self.rubric.title = title.into();
    }

    /// Replaces the criterion with the same id.
    pub fn update_criterion(&mut self, criterion: Criterion) -> AppResult<()> {
        let slot = self
            .rubric
            .criteria
            .iter_mut()
            .find(|existing| existing.id == criterion.id)
            .ok_or_else(AppError::not_found)?;
        *slot = criterion;
        Ok(())
    }

    /// Appends a placeholder criterion with the three default levels and returns its id.
    pub fn add_criterion(&mut self, now: DateTime<Utc>) -> String {
        let mut millis = now.timestamp_millis();
        let mut id = format!("custom_{millis}");
        while self.rubric.contains(&id) {
            millis += 1;
            id = format!("custom_{millis}");
        }

        let levels = DEFAULT_LEVEL_LABELS
            .iter()
            .zip(1_i64..)
            .map(|(label, score)| {
                Level::new(score, *label, format!("Description for level {score}..."))
            })
            .collect();

        self.rubric.criteria.push(Criterion {
            id: id.clone(),
            label: NEW_CRITERION_LABEL.to_string(),
            levels,
        });
        id
    }

    pub fn delete_criterion(&mut self, criterion_id: &str) {
        self.rubric
            .criteria
            .retain(|criterion| criterion.id != criterion_id);
        self.state.scores.remove(criterion_id);
    }

    pub fn summary(&self) -> ScoreSummary {
        score_service::aggregate(&self.rubric.criteria, &self.state.scores)
    }

    /// Marks a feedback request as outstanding and returns what to send.
    pub fn begin_feedback_request(&mut self) -> AppResult<FeedbackRequest> {
        if self.state.scores.values().all(|score| *score <= 0) {
            return Err(AppError::validation(
                "Select at least one score before generating feedback",
            ));
        }
        if self.feedback_in_flight {
            return Err(AppError::conflict("A feedback request is already running"));
        }

        self.feedback_in_flight = true;

        let reflection = if self.self_assessment_enabled {
            Some(self.state.student_reflection.clone()).filter(|text| !text.trim().is_empty())
        } else {
            None
        };
        let notes = Some(self.state.feedback.clone()).filter(|text| !text.trim().is_empty());

        Ok(FeedbackRequest {
            student_name: self.state.student_name.clone(),
            task: self.state.task.clone(),
            scores: self.state.scores.clone(),
            criteria: self.rubric.criteria.clone(),
            notes,
            reflection,
        })
    }

    /// Clears the in-flight flag and applies a successful result.
    pub fn finish_feedback_request(
        &mut self,
        result: AppResult<GeneratedFeedback>,
    ) -> AppResult<()> {
        self.feedback_in_flight = false;
        match result {
            Ok(generated) => {
                self.state.feedback = generated.feedback;
                self.state.strengths = generated.strengths;
                self.state.improvements = generated.improvements;
                Ok(())
            }
            Err(err) => {
                warn!(target: "app::ai", error = %err, "feedback generation failed");
                Err(err)
            }
        }
    }

    /// Releases the in-flight flag without touching the feedback text.
    pub fn abandon_feedback_request(&mut self) {
        if self.feedback_in_flight {
            debug!(target: "app::ai", "feedback request abandoned");
        }
        self.feedback_in_flight = false;
    }

    pub async fn generate_feedback(&mut self, provider: &dyn FeedbackProvider) -> AppResult<()> {
        let request = self.begin_feedback_request()?;
        let result = provider.generate_feedback(&request).await;
        self.finish_feedback_request(result)
    }

    /// Snapshot of the session as a saved assessment. The rubric is copied.
    pub fn build_record(&self, now: DateTime<Utc>) -> AppResult<SavedAssessment> {
        if self.state.student_name.trim().is_empty() {
            return Err(AppError::validation("Student name is required"));
        }

        let summary = self.summary();
        let id = self
            .current_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let student_reflection = Some(self.state.student_reflection.clone())
            .filter(|text| self.self_assessment_enabled && !text.is_empty());

        Ok(SavedAssessment {
            id,
            timestamp: now.timestamp_millis(),
            student_name: self.state.student_name.clone(),
            date: self.state.date.clone(),
            task: self.state.task.clone(),
            rubric: self.rubric.clone(),
            scores: self.state.scores.clone(),
            feedback: self.state.feedback.clone(),
            strengths: self.state.strengths.clone(),
            improvements: self.state.improvements.clone(),
            total_score: summary.total_score,
            max_score: summary.max_score,
            average_score: summary.average_score,
            student_reflection,
        })
    }

    pub fn save(
        &mut self,
        history: &AssessmentHistoryService,
        now: DateTime<Utc>,
    ) -> AppResult<SavedAssessment> {
        let record = self.build_record(now)?;
        history.save(&record)?;
        info!(target: "app::history", id = %record.id, "assessment stored");
        self.current_id = Some(record.id.clone());
        debug!(
            target: "app::history",
            total = record.total_score,
            max = record.max_score,
            "assessment totals"
        );
        Ok(record)
    }
}
