pub mod analytics;
pub mod lessons;
pub mod llm_provider;
pub mod plan;
pub mod quizzes;
pub mod reviews;
pub mod tutor;
