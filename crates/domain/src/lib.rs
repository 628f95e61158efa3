pub mod entities;
pub mod evaluation;
pub mod model_call;
pub mod ports;
pub mod repositories;

pub use entities::*;
pub use evaluation::*;
pub use judge_core::{JudgeError, JudgeResult};
pub use model_call::*;
pub use ports::*;
pub use repositories::*;
