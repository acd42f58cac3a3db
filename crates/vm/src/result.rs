//! The envelope `run` returns for a successful call (spec §4.3).

use crate::host::Event;
use animica_vm_core::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub return_value: Value,
    pub gas_used: u64,
    pub steps: u64,
    pub logs: Vec<Event>,
}
