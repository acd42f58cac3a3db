//! Structured IR → instruction IR lowering (spec §3, §4.2): the stage that
//! turns the `Module`/`Function`/`Stmt`/`Expr` tree produced by
//! [`super::ast_lower`] into the stack-machine `Prog`/`Block`/`Instr` form
//! consumed by [`encode`](super::encode), the gas estimator, and the
//! interpreter. There is no standalone original for this pass — the
//! retrieved reference implementation encodes and estimates an
//! already-built `Prog` but never shows how one gets built from the
//! structured tree — so this module follows the general stack-machine
//! shape implied by `ir.rs` and the block/label conventions `Prog` already
//! enforces via `validate_labels`.
//!
//! Each function compiles to its own `Prog` with entry label `"entry"`;
//! `CallTarget::UserFunc` calls are resolved by name at the host layer
//! rather than by inlining another function's blocks into this one.

use super::ast_lower::TERNARY_SENTINEL;
use animica_vm_core::ir::{BoolOpKind, CallTarget, Expr, Function, Instr, Module, Prog, Stmt};
use animica_vm_core::{CompileError, Value};
use std::collections::BTreeMap;

/// Accumulates sealed blocks and hands out fresh labels for branches.
struct Builder {
    blocks: BTreeMap<String, animica_vm_core::ir::Block>,
    counter: u32,
}

impl Builder {
    fn new() -> Self {
        Builder { blocks: BTreeMap::new(), counter: 0 }
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}{}", self.counter);
        self.counter += 1;
        label
    }

    fn seal(&mut self, label: String, instrs: Vec<Instr>, fallthrough: Option<String>) {
        self.blocks.insert(label.clone(), animica_vm_core::ir::Block { label, instrs, fallthrough });
    }
}

/// The block currently being built: a label plus the instructions emitted
/// into it so far. Threaded through statement and expression lowering so
/// control-flow constructs (`if`/`while`/short-circuit `and`/`or`) can seal
/// the current block and hand back a fresh one to keep writing into.
struct Cursor {
    label: String,
    instrs: Vec<Instr>,
}

fn ends_in_return(instrs: &[Instr]) -> bool {
    matches!(instrs.last(), Some(Instr::Return))
}

/// Compiles every function in `module` to its own `Prog`, keyed by name.
pub fn compile_module(module: &Module) -> Result<BTreeMap<String, Prog>, CompileError> {
    let mut out = BTreeMap::new();
    for (name, function) in &module.functions {
        out.insert(name.clone(), compile_function(function)?);
    }
    Ok(out)
}

pub fn compile_function(function: &Function) -> Result<Prog, CompileError> {
    let mut builder = Builder::new();
    let mut cur = Cursor { label: "entry".to_string(), instrs: Vec::new() };
    lower_stmts(&function.body, &mut builder, &mut cur)?;
    if !ends_in_return(&cur.instrs) {
        cur.instrs.push(Instr::LoadConst(Value::Null));
        cur.instrs.push(Instr::Return);
    }
    builder.seal(cur.label, cur.instrs, None);
    let prog = Prog { entry_label: "entry".to_string(), blocks: builder.blocks };
    prog.validate_labels().map_err(|reason| CompileError::Lower { reason })?;
    Ok(prog)
}

fn lower_stmts(stmts: &[Stmt], builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    for stmt in stmts {
        if ends_in_return(&cur.instrs) {
            // Dead code after an unconditional return; nothing left to reach.
            break;
        }
        lower_stmt(stmt, builder, cur)?;
    }
    Ok(())
}

fn expr_always_pushes(e: &Expr) -> bool {
    match e {
        Expr::Call { func, .. } => matches!(func.as_ref(), Expr::Name(n) if n == TERNARY_SENTINEL),
        _ => true,
    }
}

fn lower_stmt(stmt: &Stmt, builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    match stmt {
        Stmt::Assign { targets, value } => {
            lower_expr(value, builder, cur)?;
            // Every target after the first needs its own copy of the value;
            // the last consumes the one already on the stack.
            for target in &targets[..targets.len().saturating_sub(1)] {
                cur.instrs.push(Instr::Dup);
                store_target(target, cur);
            }
            if let Some(last) = targets.last() {
                store_target(last, cur);
            }
            Ok(())
        }
        Stmt::ExprStmt(e) => {
            lower_expr(e, builder, cur)?;
            if expr_always_pushes(e) {
                cur.instrs.push(Instr::Pop);
            }
            // Plain calls only push a value when the host returns non-null
            // (spec §3); a static `Pop` here could wrongly consume an
            // unrelated value, so we leave those as-is, mirroring the
            // interpreter's own conditional push.
            Ok(())
        }
        Stmt::Return(value) => {
            match value {
                Some(e) => lower_expr(e, builder, cur)?,
                None => cur.instrs.push(Instr::LoadConst(Value::Null)),
            }
            cur.instrs.push(Instr::Return);
            Ok(())
        }
        Stmt::If { cond, then, orelse } => lower_if(cond, then, orelse, builder, cur),
        Stmt::While { cond, body } => lower_while(cond, body, builder, cur),
    }
}

fn store_target(target: &animica_vm_core::ir::AssignTarget, cur: &mut Cursor) {
    use animica_vm_core::ir::AssignTarget;
    match target {
        AssignTarget::Name(n) => cur.instrs.push(Instr::StoreName(n.clone())),
        AssignTarget::Tuple(names) => {
            // Structured IR never produces real tuple *values*; tuple
            // targets only arise from chained/tuple assignment of a single
            // expression to several names (ast_lower desugars the rest).
            for n in names {
                cur.instrs.push(Instr::Dup);
                cur.instrs.push(Instr::StoreName(n.clone()));
            }
            cur.instrs.push(Instr::Pop);
        }
    }
}

fn lower_if(cond: &Expr, then: &[Stmt], orelse: &[Stmt], builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    lower_expr(cond, builder, cur)?;

    let then_label = builder.fresh("if_then");
    let join_label = builder.fresh("if_join");
    let else_label = if orelse.is_empty() { join_label.clone() } else { builder.fresh("if_else") };

    cur.instrs.push(Instr::JumpIfTrue(then_label.clone()));
    let head = std::mem::replace(cur, Cursor { label: then_label.clone(), instrs: Vec::new() });
    builder.seal(head.label, head.instrs, Some(else_label.clone()));

    lower_stmts(then, builder, cur)?;
    if ends_in_return(&cur.instrs) {
        let done = std::mem::replace(cur, Cursor { label: String::new(), instrs: Vec::new() });
        builder.seal(done.label, done.instrs, None);
    } else {
        let done = std::mem::replace(cur, Cursor { label: String::new(), instrs: Vec::new() });
        builder.seal(done.label, done.instrs, Some(join_label.clone()));
    }

    if !orelse.is_empty() {
        *cur = Cursor { label: else_label, instrs: Vec::new() };
        lower_stmts(orelse, builder, cur)?;
        if ends_in_return(&cur.instrs) {
            let done = std::mem::replace(cur, Cursor { label: String::new(), instrs: Vec::new() });
            builder.seal(done.label, done.instrs, None);
        } else {
            let done = std::mem::replace(cur, Cursor { label: String::new(), instrs: Vec::new() });
            builder.seal(done.label, done.instrs, Some(join_label.clone()));
        }
    }

    *cur = Cursor { label: join_label, instrs: Vec::new() };
    Ok(())
}

fn lower_while(cond: &Expr, body: &[Stmt], builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    let header_label = builder.fresh("while_head");
    let body_label = builder.fresh("while_body");
    let after_label = builder.fresh("while_after");

    let head = std::mem::replace(cur, Cursor { label: header_label.clone(), instrs: Vec::new() });
    builder.seal(head.label, head.instrs, Some(header_label.clone()));

    lower_expr(cond, builder, cur)?;
    cur.instrs.push(Instr::JumpIfTrue(body_label.clone()));
    let header = std::mem::replace(cur, Cursor { label: body_label.clone(), instrs: Vec::new() });
    builder.seal(header.label, header.instrs, Some(after_label.clone()));

    lower_stmts(body, builder, cur)?;
    if !ends_in_return(&cur.instrs) {
        cur.instrs.push(Instr::Jump(header_label));
    }
    let done = std::mem::replace(cur, Cursor { label: after_label, instrs: Vec::new() });
    builder.seal(done.label, done.instrs, None);

    Ok(())
}

fn lower_expr(expr: &Expr, builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    match expr {
        Expr::Const(v) => cur.instrs.push(Instr::LoadConst(v.clone())),
        Expr::Name(n) => cur.instrs.push(Instr::LoadName(n.clone())),
        Expr::BinOp { op, left, right } => {
            lower_expr(left, builder, cur)?;
            lower_expr(right, builder, cur)?;
            cur.instrs.push(Instr::BinOp(*op));
        }
        Expr::BoolOp { op, values } => lower_boolop(*op, values, builder, cur)?,
        Expr::UnaryOp { op, operand } => {
            lower_expr(operand, builder, cur)?;
            cur.instrs.push(Instr::UnaryOp(*op));
        }
        Expr::Compare { op, left, right } => {
            lower_expr(left, builder, cur)?;
            lower_expr(right, builder, cur)?;
            cur.instrs.push(Instr::Compare(*op));
        }
        Expr::Attribute { value, attr } => {
            lower_expr(value, builder, cur)?;
            cur.instrs.push(Instr::AttrGet(attr.clone()));
        }
        Expr::Subscript { value, index } => {
            lower_expr(value, builder, cur)?;
            lower_expr(index, builder, cur)?;
            cur.instrs.push(Instr::SubscriptGet);
        }
        Expr::Call { func, args, kwargs } => lower_call(func, args, kwargs, builder, cur)?,
    }
    Ok(())
}

/// Short-circuit `and`/`or`: fold left to right, duplicating the running
/// result to test truthiness without consuming it, so a short-circuit exit
/// leaves exactly that value on the stack.
fn lower_boolop(op: BoolOpKind, values: &[Expr], builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    if values.is_empty() {
        return Err(CompileError::Lower { reason: "boolop with no operands".to_string() });
    }
    lower_expr(&values[0], builder, cur)?;
    if values.len() == 1 {
        return Ok(());
    }

    let join_label = builder.fresh("bool_join");
    for value in &values[1..] {
        let short_label = builder.fresh("bool_short");
        let next_label = builder.fresh("bool_next");

        cur.instrs.push(Instr::Dup);
        match op {
            BoolOpKind::And => cur.instrs.push(Instr::JumpIfFalse(short_label.clone())),
            BoolOpKind::Or => cur.instrs.push(Instr::JumpIfTrue(short_label.clone())),
        }
        let prior = std::mem::replace(cur, Cursor { label: next_label, instrs: vec![Instr::Pop] });
        builder.seal(prior.label, prior.instrs, Some(cur.label.clone()));
        builder.seal(short_label, Vec::new(), Some(join_label.clone()));

        lower_expr(value, builder, cur)?;
    }
    let last = std::mem::replace(cur, Cursor { label: join_label, instrs: Vec::new() });
    builder.seal(last.label, last.instrs, Some(cur.label.clone()));
    Ok(())
}

/// `a if cond else b`, desugared by `ast_lower` into a call to
/// [`TERNARY_SENTINEL`]; lowered here as a two-way branch rather than an
/// actual `Call` instruction.
fn lower_ternary(cond: &Expr, body: &Expr, orelse: &Expr, builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    lower_expr(cond, builder, cur)?;

    let true_label = builder.fresh("tern_true");
    let false_label = builder.fresh("tern_false");
    let join_label = builder.fresh("tern_join");

    cur.instrs.push(Instr::JumpIfTrue(true_label.clone()));
    let head = std::mem::replace(cur, Cursor { label: true_label, instrs: Vec::new() });
    builder.seal(head.label, head.instrs, Some(false_label.clone()));

    lower_expr(body, builder, cur)?;
    let true_branch = std::mem::replace(cur, Cursor { label: false_label, instrs: Vec::new() });
    builder.seal(true_branch.label, true_branch.instrs, Some(join_label.clone()));

    lower_expr(orelse, builder, cur)?;
    let false_branch = std::mem::replace(cur, Cursor { label: join_label, instrs: Vec::new() });
    builder.seal(false_branch.label, false_branch.instrs, Some(cur.label.clone()));

    Ok(())
}

fn lower_call(func: &Expr, args: &[Expr], kwargs: &[(String, Expr)], builder: &mut Builder, cur: &mut Cursor) -> Result<(), CompileError> {
    if let Expr::Name(name) = func {
        if name == TERNARY_SENTINEL {
            if args.len() != 3 || !kwargs.is_empty() {
                return Err(CompileError::Lower { reason: "malformed ternary sentinel call".to_string() });
            }
            return lower_ternary(&args[0], &args[1], &args[2], builder, cur);
        }
    }

    let target = resolve_call_target(func)?;
    for a in args {
        lower_expr(a, builder, cur)?;
    }
    let mut kw_names = Vec::with_capacity(kwargs.len());
    for (name, value) in kwargs {
        lower_expr(value, builder, cur)?;
        kw_names.push(name.clone());
    }
    cur.instrs.push(Instr::Call { target, n_pos: args.len() as u32, kw_names });
    Ok(())
}

/// Resolves a call's callee expression into a `CallTarget`. Only plain
/// names (user functions) and single-level `module.func` attribute chains
/// (stdlib entries) reach this point — `validate.rs` has already rejected
/// anything else, including unapproved stdlib modules.
fn resolve_call_target(func: &Expr) -> Result<CallTarget, CompileError> {
    match func {
        Expr::Name(name) => Ok(CallTarget::UserFunc(name.clone())),
        Expr::Attribute { value, attr } => match value.as_ref() {
            Expr::Name(module) => Ok(CallTarget::Stdlib { module: module.clone(), func: attr.clone() }),
            other => Err(CompileError::Lower { reason: format!("unsupported call target {other:?}") }),
        },
        other => Err(CompileError::Lower { reason: format!("unsupported call target {other:?}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast_lower::lower_module;
    use crate::compiler::validate::validate_source;

    fn compile_src(src: &str) -> BTreeMap<String, Prog> {
        let validated = validate_source(src, "<t>").unwrap();
        let module = lower_module(validated).unwrap();
        compile_module(&module).unwrap()
    }

    #[test]
    fn straight_line_function_returns_constant() {
        let progs = compile_src("from stdlib import storage\n\ndef f():\n    return 1\n");
        let prog = &progs["f"];
        prog.validate_labels().unwrap();
        let entry = &prog.blocks[&prog.entry_label];
        assert!(matches!(entry.instrs.last(), Some(Instr::Return)));
    }

    #[test]
    fn if_else_produces_three_extra_blocks() {
        let progs = compile_src(
            "from stdlib import storage\n\ndef f(x):\n    if x:\n        return 1\n    else:\n        return 2\n",
        );
        let prog = &progs["f"];
        prog.validate_labels().unwrap();
        assert!(prog.blocks.len() >= 3);
    }

    #[test]
    fn while_loop_jumps_back_to_header() {
        let progs = compile_src(
            "from stdlib import storage\n\ndef f(x):\n    while x:\n        x = x - 1\n    return x\n",
        );
        let prog = &progs["f"];
        prog.validate_labels().unwrap();
        let has_back_edge = prog.blocks.values().any(|b| matches!(b.instrs.last(), Some(Instr::Jump(_))));
        assert!(has_back_edge);
    }

    #[test]
    fn stdlib_call_resolves_to_stdlib_target() {
        let progs = compile_src("from stdlib import storage\n\ndef f():\n    storage.sstore(b'k', b'v')\n    return 0\n");
        let prog = &progs["f"];
        let has_stdlib_call = prog.blocks.values().any(|b| {
            b.instrs.iter().any(|i| matches!(i, Instr::Call { target: CallTarget::Stdlib { module, func }, .. } if module == "storage" && func == "sstore"))
        });
        assert!(has_stdlib_call);
    }

    #[test]
    fn boolop_and_short_circuits_through_extra_blocks() {
        let progs = compile_src("from stdlib import storage\n\ndef f(a, b):\n    return a and b\n");
        let prog = &progs["f"];
        prog.validate_labels().unwrap();
        assert!(prog.blocks.len() > 1);
    }
}
