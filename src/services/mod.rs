pub mod assessment_session;
pub mod feedback_service;
pub mod history_service;
pub mod prompt_templates;
pub mod rubric_parser;
pub mod score_service;
pub mod settings_service;
pub mod template_library;
