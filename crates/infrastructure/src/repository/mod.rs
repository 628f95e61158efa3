//! Task and model config repository implementations

mod memory;
mod sqlite;
mod sqlite_model_config;

pub use memory::{InMemoryModelConfigRepository, InMemoryTaskRepository};
pub use sqlite::SqliteTaskRepository;
pub use sqlite_model_config::SqliteModelConfigRepository;
