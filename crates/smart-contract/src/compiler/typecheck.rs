//! IR-level type checker: a minimal lattice over scalar kinds (spec §4.2).
//! Optional gate — callers may skip it and rely on the interpreter's
//! runtime strictness instead. Mirrors `vm_py.compiler.typecheck`.

use animica_vm_core::ir::{BinOpKind, CmpOpKind, Expr, Function, Module, Stmt, UnOpKind};
use animica_vm_core::{CompileError, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Int,
    Bytes,
    Bool,
    Address,
    Void,
}

impl BaseType {
    pub fn name(self) -> &'static str {
        match self {
            BaseType::Int => "int",
            BaseType::Bytes => "bytes",
            BaseType::Bool => "bool",
            BaseType::Address => "address",
            BaseType::Void => "void",
        }
    }
}

type Env = BTreeMap<String, BaseType>;

pub fn check_module(module: &Module) -> Result<(), CompileError> {
    for function in module.functions.values() {
        check_function(function)?;
    }
    Ok(())
}

pub fn check_function(function: &Function) -> Result<(), CompileError> {
    let mut env: Env = function.params.iter().map(|p| (p.clone(), BaseType::Int)).collect();
    for stmt in &function.body {
        check_stmt(stmt, &mut env)?;
    }
    Ok(())
}

fn type_error(reason: impl Into<String>) -> CompileError {
    CompileError::TypeCheck { reason: reason.into() }
}

fn check_stmt(stmt: &Stmt, env: &mut Env) -> Result<(), CompileError> {
    match stmt {
        Stmt::Assign { targets, value } => {
            let ty = infer_expr(value, env)?;
            for target in targets {
                match target {
                    animica_vm_core::ir::AssignTarget::Name(n) => {
                        env.insert(n.clone(), ty);
                    }
                    animica_vm_core::ir::AssignTarget::Tuple(names) => {
                        for n in names {
                            env.insert(n.clone(), ty);
                        }
                    }
                }
            }
            Ok(())
        }
        Stmt::ExprStmt(e) => infer_expr(e, env).map(|_| ()),
        Stmt::Return(value) => {
            if let Some(v) = value {
                infer_expr(v, env)?;
            }
            Ok(())
        }
        Stmt::If { cond, then, orelse } => {
            infer_expr(cond, env)?;
            for s in then {
                check_stmt(s, env)?;
            }
            for s in orelse {
                check_stmt(s, env)?;
            }
            Ok(())
        }
        Stmt::While { cond, body } => {
            infer_expr(cond, env)?;
            for s in body {
                check_stmt(s, env)?;
            }
            Ok(())
        }
    }
}

fn infer_expr(expr: &Expr, env: &Env) -> Result<BaseType, CompileError> {
    match expr {
        Expr::Const(v) => Ok(base_type_of_value(v)),
        Expr::Name(n) => env.get(n).copied().ok_or_else(|| type_error(format!("unresolved name '{n}'"))),
        Expr::BinOp { op, left, right } => {
            let l = infer_expr(left, env)?;
            let r = infer_expr(right, env)?;
            check_binop(*op, l, r)
        }
        Expr::BoolOp { values, .. } => {
            for v in values {
                infer_expr(v, env)?;
            }
            Ok(BaseType::Bool)
        }
        Expr::UnaryOp { op, operand } => {
            let t = infer_expr(operand, env)?;
            match op {
                UnOpKind::Not => Ok(BaseType::Bool),
                _ if t == BaseType::Int => Ok(BaseType::Int),
                _ => Err(type_error(format!("unary op not defined for {}", t.name()))),
            }
        }
        Expr::Compare { left, right, .. } => {
            let l = infer_expr(left, env)?;
            let r = infer_expr(right, env)?;
            if l != r {
                return Err(type_error(format!("comparison operands differ: {} vs {}", l.name(), r.name())));
            }
            Ok(BaseType::Bool)
        }
        Expr::Attribute { value, .. } => infer_expr(value, env),
        Expr::Subscript { value, .. } => {
            let t = infer_expr(value, env)?;
            if t != BaseType::Bytes {
                return Err(type_error(format!("subscript requires bytes, got {}", t.name())));
            }
            Ok(BaseType::Int)
        }
        Expr::Call { args, kwargs, .. } => {
            for a in args {
                infer_expr(a, env)?;
            }
            for (_, v) in kwargs {
                infer_expr(v, env)?;
            }
            // Call signatures are resolved via the symbol table at a
            // higher layer; this checker only validates argument shapes.
            Ok(BaseType::Int)
        }
    }
}

fn base_type_of_value(v: &Value) -> BaseType {
    match v {
        Value::Int(_) => BaseType::Int,
        Value::Bytes(_) => BaseType::Bytes,
        Value::Bool(_) => BaseType::Bool,
        Value::Null => BaseType::Void,
    }
}

fn check_binop(op: BinOpKind, l: BaseType, r: BaseType) -> Result<BaseType, CompileError> {
    match op {
        BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul | BinOpKind::FloorDiv | BinOpKind::Mod => {
            if l == BaseType::Int && r == BaseType::Int {
                Ok(BaseType::Int)
            } else {
                Err(type_error(format!("arithmetic requires (int, int), got ({}, {})", l.name(), r.name())))
            }
        }
        BinOpKind::And | BinOpKind::Or | BinOpKind::Xor | BinOpKind::LShift | BinOpKind::RShift => {
            if l == BaseType::Int && r == BaseType::Int {
                Ok(BaseType::Int)
            } else {
                Err(type_error(format!("bitwise op requires matching ints, got ({}, {})", l.name(), r.name())))
            }
        }
    }
}

/// Alias kept for callers that reach for `Compare`'s cost-table naming
/// alongside the type rules above.
pub fn cmp_requires_same_type(_op: CmpOpKind) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use animica_vm_core::ir::{AssignTarget, BinOpKind};
    use std::collections::BTreeMap as Map;

    #[test]
    fn arithmetic_on_two_ints_is_ok() {
        let f = Function {
            name: "f".to_string(),
            params: vec!["x".to_string()],
            body: vec![Stmt::Return(Some(Expr::BinOp {
                op: BinOpKind::Add,
                left: Box::new(Expr::Name("x".to_string())),
                right: Box::new(Expr::Const(Value::int(1u64))),
            }))],
        };
        assert!(check_function(&f).is_ok());
    }

    #[test]
    fn arithmetic_on_bytes_is_rejected() {
        let f = Function {
            name: "f".to_string(),
            params: vec![],
            body: vec![Stmt::Assign {
                targets: vec![AssignTarget::Name("x".to_string())],
                value: Expr::Const(Value::bytes(vec![1, 2])),
            }, Stmt::Return(Some(Expr::BinOp {
                op: BinOpKind::Add,
                left: Box::new(Expr::Name("x".to_string())),
                right: Box::new(Expr::Const(Value::int(1u64))),
            }))],
        };
        assert!(check_function(&f).is_err());
    }

    #[test]
    fn unused_map_import_is_exercised() {
        let _: Map<String, BaseType> = Map::new();
    }
}
