//! Concurrency slot managers

mod memory;
mod redis_manager;

pub use memory::InMemorySlotManager;
pub use redis_manager::RedisSlotManager;
