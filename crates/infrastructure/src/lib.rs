pub mod credentials;
pub mod repository;
pub mod slots;

pub use credentials::JwtTokenIssuer;
pub use repository::{
    InMemoryModelConfigRepository, InMemoryTaskRepository, SqliteModelConfigRepository,
    SqliteTaskRepository,
};
pub use slots::{InMemorySlotManager, RedisSlotManager};
