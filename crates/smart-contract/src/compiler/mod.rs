//! Source → executable `Prog` compiler pipeline (spec §4.2):
//!
//! ```text
//! source text -> validate -> ast_lower -> [typecheck] -> codegen -> Prog
//! ```
//!
//! `py_ast` isolates the concrete `rustpython_parser` types; `encode` and
//! `gas_estimator` operate on an already-built `Prog`.

pub mod ast_lower;
pub mod codegen;
pub mod encode;
pub mod gas_estimator;
pub mod py_ast;
pub mod typecheck;
pub mod validate;

use animica_vm_core::ir::{Module, Prog};
use animica_vm_core::{SymbolTable, VmError};
use std::collections::BTreeMap;

/// Result of compiling one contract source file: the structured module (for
/// canonical encoding and exports introspection), one instruction-IR `Prog`
/// per function, the module's declared symbol table for storage-key
/// hinting, and the canonical `(ir_bytes, code_hash)` pair (spec §6).
pub struct CompiledContract {
    pub filename: String,
    pub module: Module,
    pub functions: BTreeMap<String, Prog>,
    pub symbols: SymbolTable,
    pub ir_bytes: Vec<u8>,
    pub code_hash: String,
}

/// Runs the full pipeline over `source`, optionally gated by the IR type
/// checker (spec §4.2 describes it as an optional pass). Each stage raises
/// its own narrow error enum; this is the boundary where they all convert
/// to the wire-facing `VmError`.
pub fn compile(source: &str, filename: &str, typecheck_enabled: bool) -> Result<CompiledContract, VmError> {
    let validated = validate::validate_source(source, filename).map_err(VmError::from)?;
    let module = ast_lower::lower_module(validated).map_err(VmError::from)?;
    if typecheck_enabled {
        typecheck::check_module(&module).map_err(VmError::from)?;
    }
    let functions = codegen::compile_module(&module).map_err(VmError::from)?;

    let mut symbols = SymbolTable::new(module.filename.clone());
    for function in module.functions.values() {
        // Pipeline already rejected duplicate function names in `validate`.
        let _ = symbols.declare_func(&function.name, function.params.clone());
    }

    let ir_bytes = encode::encode_module(&module).map_err(VmError::from)?;
    let digest = animica_cryptography::sha3_256(&ir_bytes);
    let code_hash = format!("0x{}", hex::encode(digest));

    Ok(CompiledContract { filename: module.filename.clone(), module, functions, symbols, ir_bytes, code_hash })
}
