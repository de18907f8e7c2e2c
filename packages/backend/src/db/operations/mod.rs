pub mod lessons;
pub mod qa;
pub mod quizzes;
pub mod reviews;
pub mod snapshots;
pub mod usage;
pub mod users;
