pub mod fallback;
pub mod feedback;
pub mod status;
