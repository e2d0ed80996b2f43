pub mod embedding;
pub mod fitness;
pub mod profile;
pub mod prompt;
pub mod providers;
pub mod recommendations;
pub mod retriever;
pub mod retry;
pub mod seeding;
pub mod throttle;

pub use retry::RetryPolicy;
