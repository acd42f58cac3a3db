//! IR types, value representation, gas meter, deterministic environments,
//! the symbol table, and the structured error taxonomy shared by the
//! compiler pipeline and the interpreter.

pub mod context;
pub mod error;
pub mod gas;
pub mod gas_table;
pub mod ir;
pub mod symbols;
pub mod value;

pub use context::{BlockEnv, TxEnv};
pub use error::{codes, CodecError, CompileError, ContextValue, ValidationError, VmError};
pub use gas::{GasMeter, GasSnapshot};
pub use gas_table::GasTable;
pub use ir::{AssignTarget, BinOpKind, Block, BoolOpKind, CallTarget, CmpOpKind, Expr, Function, Instr, Module, Prog, Stmt, UnOpKind};
pub use symbols::{FunctionSymbol, MethodDispatch, MethodSymbol, StorageKeyHint, Symbol, SymbolKind, SymbolTable};
pub use value::{mask, Value};
