//! The deterministic interpreter: a stack machine over
//! `animica_vm_core::ir::Prog`, plus the `HostDispatch` seam storage/stdlib
//! calls/event emission cross through.

pub mod engine;
pub mod host;
pub mod result;

pub use engine::Interpreter;
pub use host::{Event, HostDispatch};
pub use result::ExecResult;
