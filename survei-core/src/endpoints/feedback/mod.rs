pub mod get_feedback_data;
pub mod submit_feedback;
