//! Host-side implementation of the stdlib surface a contract's `import`
//! statements resolve to (spec §4.5), plus the capability/resource mediator
//! and the loader that wires a compiled contract to a live interpreter.

pub mod abi;
pub mod events;
pub mod hash;
pub mod host_impl;
pub mod loader;
pub mod manifest;
pub mod random;
pub mod resource_guard;
pub mod storage;
pub mod syscalls;
pub mod treasury;
