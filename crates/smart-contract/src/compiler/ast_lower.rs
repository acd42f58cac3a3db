//! AST → structured IR lowering (spec §4.2). Mirrors
//! `vm_py.compiler.ast_lower`: walks the validated AST, emitting the fixed
//! canonical operator-string set and desugaring chained assignment,
//! augmented assignment, tuple targets, and the ternary expression.

use super::py_ast::{self, ast};
use super::validate::ValidatedModule;
use animica_vm_core::ir::{AssignTarget, BinOpKind, BoolOpKind, CmpOpKind, Expr, Function, Module, Stmt, UnOpKind};
use animica_vm_core::{CompileError, Value};
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// Name of the synthetic function call the ternary `a if cond else b`
/// lowers to — there is no dedicated `Expr` variant for it, per spec §4.2
/// ("lowers to a ternary sentinel call").
pub const TERNARY_SENTINEL: &str = "__ternary__";

pub fn lower_module(validated: ValidatedModule) -> Result<Module, CompileError> {
    let mut functions = BTreeMap::new();
    for stmt in &validated.body {
        if let ast::Stmt::FunctionDef(f) = stmt {
            let function = lower_function(f)?;
            functions.insert(function.name.clone(), function);
        }
    }
    Ok(Module { filename: validated.filename, functions })
}

fn lower_function(f: &ast::StmtFunctionDef) -> Result<Function, CompileError> {
    let params = py_ast::simple_positional_params(&f.args).map_err(|reason| CompileError::Lower { reason })?;
    let body = lower_block(&f.body)?;
    Ok(Function { name: f.name.to_string(), params, body })
}

fn lower_block(stmts: &[ast::Stmt]) -> Result<Vec<Stmt>, CompileError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        lower_stmt(stmt, &mut out)?;
    }
    Ok(out)
}

/// Lowers one source statement, possibly emitting more than one IR `Stmt`
/// (chained assignment `a = b = expr` becomes N separate assigns).
fn lower_stmt(stmt: &ast::Stmt, out: &mut Vec<Stmt>) -> Result<(), CompileError> {
    match stmt {
        ast::Stmt::Assign(a) => {
            let value = lower_expr(&a.value)?;
            for target in &a.targets {
                out.push(Stmt::Assign { targets: vec![lower_target(target)?], value: value.clone() });
            }
        }
        ast::Stmt::AugAssign(a) => {
            let op = lower_binop(&a.op)?;
            let target = lower_target(&a.target)?;
            let load = target_to_load_expr(&target);
            let value = Expr::BinOp { op, left: Box::new(load), right: Box::new(lower_expr(&a.value)?) };
            out.push(Stmt::Assign { targets: vec![target], value });
        }
        ast::Stmt::Expr(e) => out.push(Stmt::ExprStmt(lower_expr(&e.value)?)),
        ast::Stmt::Return(r) => {
            let value = r.value.as_deref().map(lower_expr).transpose()?;
            out.push(Stmt::Return(value));
        }
        ast::Stmt::If(i) => {
            let cond = lower_expr(&i.test)?;
            let then = lower_block(&i.body)?;
            let orelse = lower_block(&i.orelse)?;
            out.push(Stmt::If { cond, then, orelse });
        }
        ast::Stmt::While(w) => {
            let cond = lower_expr(&w.test)?;
            let body = lower_block(&w.body)?;
            out.push(Stmt::While { cond, body });
        }
        ast::Stmt::Pass(_) => {}
        ast::Stmt::Import(_) | ast::Stmt::ImportFrom(_) | ast::Stmt::FunctionDef(_) | ast::Stmt::AnnAssign(_) => {}
        other => return Err(CompileError::Lower { reason: format!("unsupported statement during lowering: {other:?}") }),
    }
    Ok(())
}

/// Tuple targets lower to a single `Assign` carrying a sub-list of names,
/// so `lower_target` never produces more than one `AssignTarget`.
fn lower_target(expr: &ast::Expr) -> Result<AssignTarget, CompileError> {
    match expr {
        ast::Expr::Name(n) => Ok(AssignTarget::Name(n.id.to_string())),
        ast::Expr::Tuple(t) => {
            let mut names = Vec::with_capacity(t.elts.len());
            for elt in &t.elts {
                match elt {
                    ast::Expr::Name(n) => names.push(n.id.to_string()),
                    other => return Err(CompileError::Lower { reason: format!("unsupported tuple-target element {other:?}") }),
                }
            }
            Ok(AssignTarget::Tuple(names))
        }
        other => Err(CompileError::Lower { reason: format!("unsupported assignment target {other:?}") }),
    }
}

fn target_to_load_expr(target: &AssignTarget) -> Expr {
    match target {
        AssignTarget::Name(n) => Expr::Name(n.clone()),
        AssignTarget::Tuple(_) => Expr::Const(Value::Null),
    }
}

fn lower_expr(expr: &ast::Expr) -> Result<Expr, CompileError> {
    match expr {
        ast::Expr::Constant(c) => Ok(Expr::Const(lower_constant(&c.value)?)),
        ast::Expr::Name(n) => Ok(Expr::Name(n.id.to_string())),
        ast::Expr::BinOp(b) => Ok(Expr::BinOp { op: lower_binop(&b.op)?, left: Box::new(lower_expr(&b.left)?), right: Box::new(lower_expr(&b.right)?) }),
        ast::Expr::BoolOp(b) => {
            let op = match b.op {
                ast::BoolOp::And => BoolOpKind::And,
                ast::BoolOp::Or => BoolOpKind::Or,
            };
            let values = b.values.iter().map(lower_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::BoolOp { op, values })
        }
        ast::Expr::UnaryOp(u) => {
            let op = match u.op {
                ast::UnaryOp::UAdd => UnOpKind::Pos,
                ast::UnaryOp::USub => UnOpKind::Neg,
                ast::UnaryOp::Not => UnOpKind::Not,
                ast::UnaryOp::Invert => UnOpKind::Invert,
            };
            Ok(Expr::UnaryOp { op, operand: Box::new(lower_expr(&u.operand)?) })
        }
        ast::Expr::Compare(c) => {
            if c.ops.len() != 1 || c.comparators.len() != 1 {
                return Err(CompileError::Lower { reason: "chained comparisons are not supported".to_string() });
            }
            let op = lower_cmpop(&c.ops[0])?;
            Ok(Expr::Compare { op, left: Box::new(lower_expr(&c.left)?), right: Box::new(lower_expr(&c.comparators[0])?) })
        }
        ast::Expr::Attribute(a) => Ok(Expr::Attribute { value: Box::new(lower_expr(&a.value)?), attr: a.attr.to_string() }),
        ast::Expr::Subscript(s) => Ok(Expr::Subscript { value: Box::new(lower_expr(&s.value)?), index: Box::new(lower_expr(&s.slice)?) }),
        ast::Expr::Call(c) => {
            let func = lower_expr(&c.func)?;
            let args = c.args.iter().map(lower_expr).collect::<Result<Vec<_>, _>>()?;
            let kwargs = c
                .keywords
                .iter()
                .map(|k| {
                    let name = k.arg.clone().ok_or_else(|| CompileError::Lower { reason: "**kwargs expansion unsupported".to_string() })?;
                    Ok((name.to_string(), lower_expr(&k.value)?))
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            Ok(Expr::Call { func: Box::new(func), args, kwargs })
        }
        ast::Expr::IfExp(i) => {
            // `a if cond else b` -> __ternary__(cond, a, b)
            let cond = lower_expr(&i.test)?;
            let body = lower_expr(&i.body)?;
            let orelse = lower_expr(&i.orelse)?;
            Ok(Expr::Call { func: Box::new(Expr::Name(TERNARY_SENTINEL.to_string())), args: vec![cond, body, orelse], kwargs: vec![] })
        }
        other => Err(CompileError::Lower { reason: format!("unsupported expression during lowering: {other:?}") }),
    }
}

fn lower_constant(value: &ast::Constant) -> Result<Value, CompileError> {
    match value {
        ast::Constant::Int(i) => {
            let (sign, digits) = i.to_bytes_be();
            if sign == num_bigint::Sign::Minus {
                return Err(CompileError::Lower { reason: "negative integer literals are not supported".to_string() });
            }
            Ok(Value::int(BigUint::from_bytes_be(&digits)))
        }
        ast::Constant::Bytes(b) => Ok(Value::bytes(b.clone())),
        ast::Constant::Bool(b) => Ok(Value::Bool(*b)),
        ast::Constant::None => Ok(Value::Null),
        ast::Constant::Float(_) => Err(CompileError::Lower { reason: "float literals are rejected (DET003)".to_string() }),
        other => Err(CompileError::Lower { reason: format!("unsupported literal {other:?}") }),
    }
}

fn lower_binop(op: &ast::Operator) -> Result<BinOpKind, CompileError> {
    Ok(match op {
        ast::Operator::Add => BinOpKind::Add,
        ast::Operator::Sub => BinOpKind::Sub,
        ast::Operator::Mult => BinOpKind::Mul,
        ast::Operator::FloorDiv => BinOpKind::FloorDiv,
        ast::Operator::Mod => BinOpKind::Mod,
        ast::Operator::BitAnd => BinOpKind::And,
        ast::Operator::BitOr => BinOpKind::Or,
        ast::Operator::BitXor => BinOpKind::Xor,
        ast::Operator::LShift => BinOpKind::LShift,
        ast::Operator::RShift => BinOpKind::RShift,
        other => return Err(CompileError::Lower { reason: format!("unsupported operator {other:?}") }),
    })
}

fn lower_cmpop(op: &ast::CmpOp) -> Result<CmpOpKind, CompileError> {
    Ok(match op {
        ast::CmpOp::Eq => CmpOpKind::Eq,
        ast::CmpOp::NotEq => CmpOpKind::Ne,
        ast::CmpOp::Lt => CmpOpKind::Lt,
        ast::CmpOp::LtE => CmpOpKind::Le,
        ast::CmpOp::Gt => CmpOpKind::Gt,
        ast::CmpOp::GtE => CmpOpKind::Ge,
        ast::CmpOp::In => CmpOpKind::In,
        ast::CmpOp::NotIn => CmpOpKind::NotIn,
        ast::CmpOp::Is => CmpOpKind::Is,
        ast::CmpOp::IsNot => CmpOpKind::IsNot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::validate::validate_source;

    #[test]
    fn augmented_assign_desugars_to_binop_assign() {
        let validated = validate_source("from stdlib import storage\n\ndef f(x):\n    x += 1\n    return x\n", "<t>").unwrap();
        let module = lower_module(validated).unwrap();
        let f = module.functions.get("f").unwrap();
        assert!(matches!(&f.body[0], Stmt::Assign { value: Expr::BinOp { op: BinOpKind::Add, .. }, .. }));
    }

    #[test]
    fn chained_assignment_expands_to_two_assigns() {
        let validated = validate_source("from stdlib import storage\n\ndef f():\n    a = b = 1\n    return a\n", "<t>").unwrap();
        let module = lower_module(validated).unwrap();
        let f = module.functions.get("f").unwrap();
        assert_eq!(f.body.len(), 3);
    }
}
