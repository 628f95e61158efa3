pub mod args;
pub mod interpreter;
pub mod progress;
pub mod registry;
pub mod supervisor;

pub use registry::{ProcessHandle, ProcessRegistry};
pub use supervisor::{EvaluationTaskSupervisor, SupervisorSettings};
