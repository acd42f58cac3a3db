//! The seam between the interpreter and everything outside deterministic
//! execution: storage, event emission, and the stdlib call surface.
//!
//! The interpreter never talks to storage or stdlib modules directly; it
//! calls through `HostDispatch`, which the `animica-smart-contract` crate
//! implements once (resource-gated, capability-checked) to avoid the
//! circular dependency a direct `vm -> smart-contract` link would create.

use animica_vm_core::{TxEnv, Value, VmError};

/// One emitted event, ready to be appended to the call's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: Vec<u8>,
    pub args: Vec<(String, Value)>,
}

/// Implemented by whatever embeds the interpreter to answer storage reads,
/// storage writes, stdlib calls, and event emission.
pub trait HostDispatch {
    fn storage_load(&mut self, key: &[u8]) -> Result<Vec<u8>, VmError>;
    fn storage_store(&mut self, key: &[u8], value: &[u8]) -> Result<(), VmError>;

    /// Dispatch a stdlib call. `module`/`func` name the target (e.g.
    /// `"hash"`/`"sha3_256"`); `args` holds all `n_pos + kw_names.len()`
    /// values in push order (positional first, then keyword values in
    /// `kw_names` order). Unknown `(module, func)` pairs are a
    /// validation-kind error, raised by the implementor, not the
    /// interpreter.
    fn call_stdlib(&mut self, module: &str, func: &str, args: Vec<Value>, kw_names: &[String]) -> Result<Value, VmError>;

    /// Dispatch a call to a user-defined function in the same module.
    fn call_user_func(&mut self, name: &str, args: Vec<Value>) -> Result<Value, VmError>;

    fn emit_event(&mut self, event: Event);

    fn tx_env(&self) -> &TxEnv;
}
