//! The two IR layers produced by the compiler pipeline (spec §3, §4.2):
//! structured IR (`Module`/`Function`/`Stmt`/`Expr`), mirroring a restricted
//! Python AST, and instruction IR (`Prog`/`Block`/`Instr`), the stack-machine
//! form the interpreter actually runs.
//!
//! Both layers are tagged sum types rather than duck-typed nodes, per the
//! redesign direction: the canonical encoder discriminates on the leading
//! integer tag in [`tags`], the decoder matches on it.

use crate::value::Value;
use std::collections::BTreeMap;

/// Fixed integer tags for the canonical `[tag, field1, field2, …]` encoding.
/// Stable across versions; never renumber an existing entry.
pub mod tags {
    pub const MODULE: u64 = 1;
    pub const FUNCTION: u64 = 2;

    pub const EXPR_CONST: u64 = 10;
    pub const EXPR_NAME: u64 = 11;
    pub const EXPR_BINOP: u64 = 12;
    pub const EXPR_BOOLOP: u64 = 13;
    pub const EXPR_UNARYOP: u64 = 14;
    pub const EXPR_COMPARE: u64 = 15;
    pub const EXPR_ATTRIBUTE: u64 = 16;
    pub const EXPR_SUBSCRIPT: u64 = 17;
    pub const EXPR_CALL: u64 = 18;

    pub const STMT_ASSIGN: u64 = 30;
    pub const STMT_EXPRSTMT: u64 = 31;
    pub const STMT_RETURN: u64 = 32;
    pub const STMT_IF: u64 = 33;
    pub const STMT_WHILE: u64 = 34;

    pub const PROG: u64 = 50;
    pub const BLOCK: u64 = 51;

    pub const INSTR_LOAD_CONST: u64 = 60;
    pub const INSTR_LOAD_NAME: u64 = 61;
    pub const INSTR_STORE_NAME: u64 = 62;
    pub const INSTR_ATTR_GET: u64 = 63;
    pub const INSTR_SUBSCRIPT_GET: u64 = 64;
    pub const INSTR_BINOP: u64 = 65;
    pub const INSTR_UNARYOP: u64 = 66;
    pub const INSTR_COMPARE: u64 = 67;
    pub const INSTR_ISZERO: u64 = 76;
    pub const INSTR_BYTESLEN: u64 = 77;
    pub const INSTR_CAT: u64 = 78;
    pub const INSTR_SLOAD: u64 = 79;
    pub const INSTR_SSTORE: u64 = 80;
    pub const INSTR_CALL: u64 = 68;
    pub const INSTR_POP: u64 = 69;
    pub const INSTR_DUP: u64 = 70;
    pub const INSTR_RETURN: u64 = 71;
    pub const INSTR_JUMP: u64 = 72;
    pub const INSTR_JUMP_IF_TRUE: u64 = 73;
    pub const INSTR_JUMP_IF_FALSE: u64 = 74;
    pub const INSTR_NOP: u64 = 75;
}

macro_rules! canonical_op_enum {
    ($name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $str),+
                }
            }

            pub fn from_str(s: &str) -> Option<Self> {
                match s {
                    $($str => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

canonical_op_enum!(BinOpKind {
    Add => "add",
    Sub => "sub",
    Mul => "mul",
    FloorDiv => "floordiv",
    Mod => "mod",
    And => "and",
    Or => "or",
    Xor => "xor",
    LShift => "lshift",
    RShift => "rshift",
});

canonical_op_enum!(BoolOpKind {
    And => "and",
    Or => "or",
});

canonical_op_enum!(UnOpKind {
    Pos => "pos",
    Neg => "neg",
    Not => "not",
    Invert => "invert",
});

canonical_op_enum!(CmpOpKind {
    Eq => "eq",
    Ne => "ne",
    Lt => "lt",
    Le => "le",
    Gt => "gt",
    Ge => "ge",
    In => "in",
    NotIn => "not_in",
    Is => "is",
    IsNot => "is_not",
});

/// Assignment target: a plain name, or a tuple of names (`a, b = ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    Name(String),
    Tuple(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(Value),
    Name(String),
    BinOp { op: BinOpKind, left: Box<Expr>, right: Box<Expr> },
    BoolOp { op: BoolOpKind, values: Vec<Expr> },
    UnaryOp { op: UnOpKind, operand: Box<Expr> },
    /// Binary only; chained comparisons are rejected at validation.
    Compare { op: CmpOpKind, left: Box<Expr>, right: Box<Expr> },
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Call { func: Box<Expr>, args: Vec<Expr>, kwargs: Vec<(String, Expr)> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign { targets: Vec<AssignTarget>, value: Expr },
    ExprStmt(Expr),
    Return(Option<Expr>),
    If { cond: Expr, then: Vec<Stmt>, orelse: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Structured IR for one source file. `functions` is a `BTreeMap` so
/// iteration order is always sorted by name, matching the canonical
/// encoding's "list of pairs sorted by key string" rule without extra work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub filename: String,
    pub functions: BTreeMap<String, Function>,
}

/// What a `Call` instruction invokes. Resolved once at lowering time rather
/// than carried as a single dotted string and re-parsed on every call, per
/// the static-dispatch redesign direction — see
/// [`crate::symbols::MethodDispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A user-defined function in the same module.
    UserFunc(String),
    /// A host stdlib entry, e.g. `storage.get` lowered from `storage.get(...)`.
    Stdlib { module: String, func: String },
}

/// A single opcode in the instruction IR (spec §3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    LoadConst(Value),
    LoadName(String),
    StoreName(String),
    AttrGet(String),
    SubscriptGet,
    BinOp(BinOpKind),
    UnaryOp(UnOpKind),
    Compare(CmpOpKind),
    /// `empty bytes` and the integer/bool zero are zero; everything else is one.
    Iszero,
    /// Pops bytes, pushes its length as an int.
    BytesLen,
    /// Pops two bytes values, pushes their concatenation.
    Cat,
    /// Reads a storage value. Key comes off the stack unless `immediate_key`
    /// is set, in which case it is a literal baked in at compile time.
    SLoad { immediate_key: Option<Vec<u8>> },
    /// Writes a storage value. Same key convention as `SLoad`.
    SStore { immediate_key: Option<Vec<u8>> },
    Call { target: CallTarget, n_pos: u32, kw_names: Vec<String> },
    Pop,
    Dup,
    Return,
    Jump(String),
    JumpIfTrue(String),
    JumpIfFalse(String),
    Nop,
}

/// A labeled straight-line run of instructions. `fallthrough`, when set, is
/// the label executed next if control reaches the end of `instrs` without a
/// `Return` or explicit `Jump*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: String,
    pub instrs: Vec<Instr>,
    pub fallthrough: Option<String>,
}

/// A compiled function body as a label → block map, always serialized
/// sorted by label (spec §3, §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prog {
    pub entry_label: String,
    pub blocks: BTreeMap<String, Block>,
}

impl Prog {
    /// Every label referenced by a `Jump*` or `fallthrough` must name a
    /// present block; this is the check the interpreter relies on never
    /// having to re-do mid-execution.
    pub fn validate_labels(&self) -> Result<(), String> {
        if !self.blocks.contains_key(&self.entry_label) {
            return Err(format!("entry label '{}' not present", self.entry_label));
        }
        for block in self.blocks.values() {
            if let Some(fallthrough) = &block.fallthrough {
                if !self.blocks.contains_key(fallthrough) {
                    return Err(format!("block '{}' falls through to unknown label '{}'", block.label, fallthrough));
                }
            }
            for instr in &block.instrs {
                let target = match instr {
                    Instr::Jump(label) | Instr::JumpIfTrue(label) | Instr::JumpIfFalse(label) => Some(label),
                    _ => None,
                };
                if let Some(label) = target {
                    if !self.blocks.contains_key(label) {
                        return Err(format!("block '{}' jumps to unknown label '{}'", block.label, label));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_kind_round_trips_through_canonical_string() {
        for op in [BinOpKind::Add, BinOpKind::FloorDiv, BinOpKind::Xor] {
            assert_eq!(BinOpKind::from_str(op.as_str()), Some(op));
        }
    }

    #[test]
    fn validate_labels_catches_unknown_jump_target() {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block { label: "entry".to_string(), instrs: vec![Instr::Jump("missing".to_string())], fallthrough: None },
        );
        let prog = Prog { entry_label: "entry".to_string(), blocks };
        assert!(prog.validate_labels().is_err());
    }

    #[test]
    fn validate_labels_accepts_well_formed_prog() {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block { label: "entry".to_string(), instrs: vec![Instr::Return], fallthrough: None },
        );
        let prog = Prog { entry_label: "entry".to_string(), blocks };
        assert!(prog.validate_labels().is_ok());
    }
}
