//! `animica-smart-contract` — the source validator, compiler pipeline, and
//! host stdlib surface for Animica's deterministic Python-VM contracts
//! (spec §4). `compiler` turns contract source into executable `Prog`s;
//! `runtime` is the host-side implementation of the stdlib surface
//! contracts call into (storage, events, hashing, randomness, treasury,
//! syscalls) plus the capability/resource mediator and the loader that
//! wires a compiled contract to a live [`animica_vm::Interpreter`].

pub mod compiler;
pub mod runtime;

pub use compiler::{compile, CompiledContract};
