pub mod admission;
pub mod dispatcher;
pub mod wire;

pub use admission::{AdmissionPolicy, SlotGuard};
pub use dispatcher::ModelDispatcher;
