pub mod ai_reviews;
pub mod github;
pub mod pulls;
pub mod system;
