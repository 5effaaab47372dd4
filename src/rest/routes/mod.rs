pub mod artifacts;
pub mod health;
pub mod jobs;
pub mod templates;
