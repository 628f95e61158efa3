pub mod health;
pub mod model_call;
pub mod tasks;
