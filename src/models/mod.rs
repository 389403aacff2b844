pub mod assessment;
pub mod feedback;
pub mod rubric;
pub mod settings;
