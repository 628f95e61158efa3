pub mod config;
pub mod errors;
pub mod rate_limit;

pub use config::AppConfig;
pub use errors::{JudgeError, JudgeResult};
pub use rate_limit::SlidingWindowLimiter;
