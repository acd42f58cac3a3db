//! Deterministic stack-machine interpreter over the instruction IR (spec
//! §4.3). Mirrors `vm_py.runtime.engine`'s instruction cycle: step-limit
//! check, gas charge, step increment, then dispatch — in that order, every
//! instruction, no exceptions.

use crate::host::{Event, HostDispatch};
use crate::result::ExecResult;
use animica_vm_core::ir::{BinOpKind, CallTarget, CmpOpKind, Instr, UnOpKind};
use animica_vm_core::{codes, mask, GasMeter, GasTable, Prog, Value, VmError};
use num_traits::{ToPrimitive, Zero};
use std::collections::BTreeMap;

fn vm_error(message: impl Into<String>) -> VmError {
    VmError::new(codes::VM_ERROR, message)
}

/// Runs one call. Constructed fresh per call; not reused across calls.
pub struct Interpreter<'h, H: HostDispatch> {
    host: &'h mut H,
    gas: GasMeter,
    gas_table: GasTable,
    step_limit: u64,
    steps: u64,
    logs: Vec<Event>,
}

impl<'h, H: HostDispatch> Interpreter<'h, H> {
    pub fn new(host: &'h mut H, gas_limit: u64, step_limit: u64, gas_table: GasTable) -> Self {
        Interpreter { host, gas: GasMeter::new(gas_limit), gas_table, step_limit, steps: 0, logs: Vec::new() }
    }

    /// `run(program, entry_label)`. Defaults `entry_label` to `"entry"`.
    pub fn run(&mut self, prog: &Prog, entry_label: Option<&str>, args: Vec<(String, Value)>) -> Result<ExecResult, VmError> {
        let label = entry_label.unwrap_or("entry");
        let mut block = prog
            .blocks
            .get(label)
            .ok_or_else(|| vm_error(format!("entry label '{label}' not found")).with("entry_label", label.to_string()))?;

        let mut locals: BTreeMap<String, Value> = args.into_iter().collect();
        let mut stack: Vec<Value> = Vec::new();

        loop {
            let mut jumped = false;
            for instr in &block.instrs {
                if let Some(return_value) = self.step(instr, &mut stack, &mut locals, prog, &mut block, &mut jumped)? {
                    return Ok(ExecResult {
                        return_value,
                        gas_used: self.gas.used(),
                        steps: self.steps,
                        logs: std::mem::take(&mut self.logs),
                    });
                }
                if jumped {
                    break;
                }
            }
            if !jumped {
                match &block.fallthrough {
                    Some(label) => {
                        block = resolve_label(prog, label)?;
                    }
                    None => {
                        // Ran off the block end with no explicit Return/Jump
                        // and no fallthrough edge: implicit return of
                        // top-of-stack, or null.
                        let return_value = stack.pop().unwrap_or(Value::Null);
                        return Ok(ExecResult {
                            return_value,
                            gas_used: self.gas.used(),
                            steps: self.steps,
                            logs: std::mem::take(&mut self.logs),
                        });
                    }
                }
            }
        }
    }

    fn gate(&mut self, cost_key: &str) -> Result<(), VmError> {
        if self.steps >= self.step_limit {
            return Err(vm_error("step limit exceeded").with("step_limit", self.step_limit));
        }
        self.gas.consume(self.gas_table.cost(cost_key))?;
        self.steps += 1;
        Ok(())
    }

    fn pop(&self, stack: &mut Vec<Value>) -> Result<Value, VmError> {
        stack.pop().ok_or_else(|| vm_error("stack underflow"))
    }

    /// Execute one instruction. Returns `Some(value)` if this instruction
    /// completed the call (a `Return`), otherwise `None`. `jumped` is set if
    /// this instruction is a control-flow transfer, in which case `*block`
    /// has already been updated to the target.
    #[allow(clippy::too_many_arguments)]
    fn step<'p>(
        &mut self,
        instr: &Instr,
        stack: &mut Vec<Value>,
        locals: &mut BTreeMap<String, Value>,
        prog: &'p Prog,
        block: &mut &'p animica_vm_core::ir::Block,
        jumped: &mut bool,
    ) -> Result<Option<Value>, VmError> {
        *jumped = false;
        match instr {
            Instr::LoadConst(v) => {
                self.gate("load_const")?;
                stack.push(v.clone());
            }
            Instr::LoadName(n) => {
                self.gate("load_name")?;
                let v = locals.get(n).cloned().ok_or_else(|| vm_error(format!("undefined name '{n}'")))?;
                stack.push(v);
            }
            Instr::StoreName(n) => {
                self.gate("store_name")?;
                let v = self.pop(stack)?;
                locals.insert(n.clone(), v);
            }
            Instr::AttrGet(_attr) => {
                self.gate("attr_get")?;
                return Err(vm_error("attribute access is not supported at runtime"));
            }
            Instr::SubscriptGet => {
                self.gate("subscript_get")?;
                let index = self.pop(stack)?;
                let base = self.pop(stack)?;
                stack.push(subscript_get(&base, &index)?);
            }
            Instr::BinOp(op) => {
                self.gate(binop_cost_key(*op))?;
                let right = self.pop(stack)?;
                let left = self.pop(stack)?;
                stack.push(eval_binop(*op, left, right)?);
            }
            Instr::UnaryOp(op) => {
                self.gate(unop_cost_key(*op))?;
                let operand = self.pop(stack)?;
                stack.push(eval_unaryop(*op, operand)?);
            }
            Instr::Compare(op) => {
                self.gate(cmp_cost_key(*op))?;
                let right = self.pop(stack)?;
                let left = self.pop(stack)?;
                stack.push(Value::Bool(eval_compare(*op, &left, &right)?));
            }
            Instr::Iszero => {
                self.gate("iszero")?;
                let v = self.pop(stack)?;
                stack.push(Value::Bool(v.is_zero()));
            }
            Instr::BytesLen => {
                self.gate("byteslen")?;
                let v = self.pop(stack)?;
                match v {
                    Value::Bytes(b) => stack.push(Value::int(b.len() as u64)),
                    other => return Err(vm_error(format!("BYTESLEN expects bytes, got {}", other.type_name()))),
                }
            }
            Instr::Cat => {
                self.gate("cat")?;
                let right = self.pop(stack)?;
                let left = self.pop(stack)?;
                match (left, right) {
                    (Value::Bytes(mut a), Value::Bytes(b)) => {
                        a.extend_from_slice(&b);
                        stack.push(Value::Bytes(a));
                    }
                    (l, r) => return Err(vm_error(format!("CAT expects (bytes, bytes), got ({}, {})", l.type_name(), r.type_name()))),
                }
            }
            Instr::SLoad { immediate_key } => {
                self.gate("sload")?;
                let key = match immediate_key {
                    Some(k) => k.clone(),
                    None => match self.pop(stack)? {
                        Value::Bytes(b) => b,
                        other => return Err(vm_error(format!("SLOAD key must be bytes, got {}", other.type_name()))),
                    },
                };
                let value = self.host.storage_load(&key)?;
                stack.push(Value::Bytes(value));
            }
            Instr::SStore { immediate_key } => {
                self.gate("sstore")?;
                let value = match self.pop(stack)? {
                    Value::Bytes(b) => b,
                    other => return Err(vm_error(format!("SSTORE value must be bytes, got {}", other.type_name()))),
                };
                let key = match immediate_key {
                    Some(k) => k.clone(),
                    None => match self.pop(stack)? {
                        Value::Bytes(b) => b,
                        other => return Err(vm_error(format!("SSTORE key must be bytes, got {}", other.type_name()))),
                    },
                };
                self.host.storage_store(&key, &value)?;
            }
            Instr::Call { target, n_pos, kw_names } => {
                let call_cost = self.gas_table.call_base()
                    + (*n_pos as u64) * self.gas_table.call_arg()
                    + (kw_names.len() as u64) * self.gas_table.call_kwarg();
                if self.steps >= self.step_limit {
                    return Err(vm_error("step limit exceeded").with("step_limit", self.step_limit));
                }
                self.gas.consume(call_cost)?;
                self.steps += 1;

                let total_args = *n_pos as usize + kw_names.len();
                if stack.len() < total_args {
                    return Err(vm_error("stack underflow in CALL"));
                }
                let args: Vec<Value> = stack.split_off(stack.len() - total_args);
                // args is currently in push order (left -> right); that's
                // already the order the host expects.
                let result = match target {
                    CallTarget::UserFunc(name) => self.host.call_user_func(name, args),
                    CallTarget::Stdlib { module, func } => self.host.call_stdlib(module, func, args, kw_names),
                }?;
                if !matches!(result, Value::Null) {
                    stack.push(result);
                }
            }
            Instr::Pop => {
                self.gate("pop")?;
                self.pop(stack)?;
            }
            Instr::Dup => {
                self.gate("dup")?;
                let top = stack.last().cloned().ok_or_else(|| vm_error("stack underflow"))?;
                stack.push(top);
            }
            Instr::Return => {
                self.gate("return")?;
                let v = stack.pop().unwrap_or(Value::Null);
                return Ok(Some(v));
            }
            Instr::Jump(label) => {
                self.gate("jump")?;
                *block = resolve_label(prog, label)?;
                *jumped = true;
            }
            Instr::JumpIfTrue(label) => {
                self.gate("jump_if")?;
                let cond = self.pop(stack)?;
                if cond.truthy() {
                    *block = resolve_label(prog, label)?;
                    *jumped = true;
                }
            }
            Instr::JumpIfFalse(label) => {
                self.gate("jump_if")?;
                let cond = self.pop(stack)?;
                if !cond.truthy() {
                    *block = resolve_label(prog, label)?;
                    *jumped = true;
                }
            }
            Instr::Nop => {
                self.gate("nop")?;
            }
        }
        Ok(None)
    }
}

fn resolve_label<'p>(prog: &'p Prog, label: &str) -> Result<&'p animica_vm_core::ir::Block, VmError> {
    prog.blocks.get(label).ok_or_else(|| vm_error(format!("unknown label '{label}'")).with("label", label.to_string()))
}

fn subscript_get(base: &Value, index: &Value) -> Result<Value, VmError> {
    match (base, index) {
        (Value::Bytes(b), Value::Int(i)) => {
            let idx = i.to_usize().ok_or_else(|| vm_error("subscript index out of range"))?;
            let byte = b.get(idx).ok_or_else(|| vm_error("subscript index out of range"))?;
            Ok(Value::int(*byte as u64))
        }
        (b, i) => Err(vm_error(format!("unsupported subscript on ({}, {})", b.type_name(), i.type_name()))),
    }
}

fn binop_cost_key(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Add => "binop_add",
        BinOpKind::Sub => "binop_sub",
        BinOpKind::Mul => "binop_mul",
        BinOpKind::FloorDiv => "binop_floordiv",
        BinOpKind::Mod => "binop_mod",
        BinOpKind::And => "binop_and",
        BinOpKind::Or => "binop_or",
        BinOpKind::Xor => "binop_xor",
        BinOpKind::LShift => "binop_lshift",
        BinOpKind::RShift => "binop_rshift",
    }
}

fn unop_cost_key(op: UnOpKind) -> &'static str {
    match op {
        UnOpKind::Pos => "unary_pos",
        UnOpKind::Neg => "unary_neg",
        UnOpKind::Not => "unary_not",
        UnOpKind::Invert => "unary_invert",
    }
}

fn cmp_cost_key(op: CmpOpKind) -> &'static str {
    match op {
        CmpOpKind::Eq => "cmp_eq",
        CmpOpKind::Ne => "cmp_ne",
        CmpOpKind::Lt => "cmp_lt",
        CmpOpKind::Le => "cmp_le",
        CmpOpKind::Gt => "cmp_gt",
        CmpOpKind::Ge => "cmp_ge",
        CmpOpKind::In => "cmp_in",
        CmpOpKind::NotIn => "cmp_not_in",
        CmpOpKind::Is => "cmp_is",
        CmpOpKind::IsNot => "cmp_is_not",
    }
}

fn modulus() -> num_bigint::BigUint {
    num_bigint::BigUint::from(1u8) << animica_config::NUMERIC_BIT_WIDTH
}

/// `modulus() - v`, i.e. the fixed-width two's-complement negation of `v`.
fn complement(v: &num_bigint::BigUint) -> num_bigint::BigUint {
    if v.is_zero() {
        num_bigint::BigUint::zero()
    } else {
        modulus() - v
    }
}

/// Arithmetic/bitwise on fixed-width unsigned modulus. Division/modulus by
/// zero yields zero rather than trapping (spec §4.3).
fn eval_binop(op: BinOpKind, left: Value, right: Value) -> Result<Value, VmError> {
    let (a, b) = match (left, right) {
        (Value::Int(a), Value::Int(b)) => (a, b),
        (l, r) => return Err(vm_error(format!("BINOP {} expects (int, int), got ({}, {})", op.as_str(), l.type_name(), r.type_name()))),
    };
    let result = match op {
        BinOpKind::Add => mask(a + b),
        // a - b (mod 2^N) == a + complement(b) (mod 2^N)
        BinOpKind::Sub => mask(a + complement(&b)),
        BinOpKind::Mul => mask(a * b),
        BinOpKind::FloorDiv => {
            if b.is_zero() {
                b
            } else {
                a / b
            }
        }
        BinOpKind::Mod => {
            if b.is_zero() {
                b
            } else {
                a % b
            }
        }
        BinOpKind::And => a & b,
        BinOpKind::Or => a | b,
        BinOpKind::Xor => a ^ b,
        BinOpKind::LShift => mask(a << shift_amount(&b)?),
        BinOpKind::RShift => a >> shift_amount(&b)?,
    };
    Ok(Value::Int(result))
}

fn shift_amount(b: &num_bigint::BigUint) -> Result<u32, VmError> {
    b.to_u32().ok_or_else(|| vm_error("shift amount out of range"))
}

fn eval_unaryop(op: UnOpKind, operand: Value) -> Result<Value, VmError> {
    match (op, operand) {
        (UnOpKind::Pos, Value::Int(v)) => Ok(Value::Int(v)),
        (UnOpKind::Neg, Value::Int(v)) => Ok(Value::Int(complement(&v))),
        (UnOpKind::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnOpKind::Invert, Value::Int(v)) => Ok(Value::Int((modulus() - num_bigint::BigUint::from(1u8)) ^ v)),
        (op, v) => Err(vm_error(format!("UNARYOP {} not defined for {}", op.as_str(), v.type_name()))),
    }
}

fn eval_compare(op: CmpOpKind, left: &Value, right: &Value) -> Result<bool, VmError> {
    match op {
        CmpOpKind::Eq => Ok(left == right),
        CmpOpKind::Ne => Ok(left != right),
        CmpOpKind::Is => Ok(left == right),
        CmpOpKind::IsNot => Ok(left != right),
        CmpOpKind::Lt | CmpOpKind::Le | CmpOpKind::Gt | CmpOpKind::Ge => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(match op {
                CmpOpKind::Lt => a < b,
                CmpOpKind::Le => a <= b,
                CmpOpKind::Gt => a > b,
                CmpOpKind::Ge => a >= b,
                _ => unreachable!(),
            }),
            (a, b) => Err(vm_error(format!("COMPARE {} expects (int, int), got ({}, {})", op.as_str(), a.type_name(), b.type_name()))),
        },
        CmpOpKind::In | CmpOpKind::NotIn => match (left, right) {
            (Value::Bytes(needle), Value::Bytes(haystack)) => {
                let found = needle.len() <= haystack.len() && haystack.windows(needle.len().max(1)).any(|w| w == needle.as_slice());
                Ok(if op == CmpOpKind::In { found } else { !found })
            }
            (a, b) => Err(vm_error(format!("COMPARE {} expects (bytes, bytes), got ({}, {})", op.as_str(), a.type_name(), b.type_name()))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animica_vm_core::ir::Block;
    use animica_vm_core::TxEnv;
    use std::collections::BTreeMap;

    struct NullHost {
        storage: BTreeMap<Vec<u8>, Vec<u8>>,
        tx_env: TxEnv,
        events: Vec<Event>,
    }

    impl NullHost {
        fn new() -> Self {
            NullHost {
                storage: BTreeMap::new(),
                tx_env: TxEnv::new(vec![0; 32], vec![1; 20], None, 0, 1_000_000, 0),
                events: Vec::new(),
            }
        }
    }

    impl HostDispatch for NullHost {
        fn storage_load(&mut self, key: &[u8]) -> Result<Vec<u8>, VmError> {
            Ok(self.storage.get(key).cloned().unwrap_or_default())
        }
        fn storage_store(&mut self, key: &[u8], value: &[u8]) -> Result<(), VmError> {
            self.storage.insert(key.to_vec(), value.to_vec());
            Ok(())
        }
        fn call_stdlib(&mut self, module: &str, func: &str, _args: Vec<Value>, _kw_names: &[String]) -> Result<Value, VmError> {
            Err(vm_error(format!("unknown stdlib entry {module}.{func}")))
        }
        fn call_user_func(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, VmError> {
            Err(vm_error(format!("unknown function {name}")))
        }
        fn emit_event(&mut self, event: Event) {
            self.events.push(event);
        }
        fn tx_env(&self) -> &TxEnv {
            &self.tx_env
        }
    }

    fn one_block_prog(instrs: Vec<Instr>) -> Prog {
        let mut blocks = BTreeMap::new();
        blocks.insert("entry".to_string(), Block { label: "entry".to_string(), instrs, fallthrough: None });
        Prog { entry_label: "entry".to_string(), blocks }
    }

    #[test]
    fn adds_two_constants_and_returns() {
        let prog = one_block_prog(vec![
            Instr::LoadConst(Value::int(2u64)),
            Instr::LoadConst(Value::int(3u64)),
            Instr::BinOp(BinOpKind::Add),
            Instr::Return,
        ]);
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 10_000, 1_000_000, GasTable::default());
        let result = interp.run(&prog, None, vec![]).unwrap();
        assert_eq!(result.return_value, Value::int(5u64));
        assert!(result.gas_used > 0);
    }

    #[test]
    fn division_by_zero_yields_zero_not_a_trap() {
        let prog = one_block_prog(vec![
            Instr::LoadConst(Value::int(7u64)),
            Instr::LoadConst(Value::int(0u64)),
            Instr::BinOp(BinOpKind::FloorDiv),
            Instr::Return,
        ]);
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 10_000, 1_000_000, GasTable::default());
        let result = interp.run(&prog, None, vec![]).unwrap();
        assert_eq!(result.return_value, Value::int(0u64));
    }

    #[test]
    fn out_of_gas_is_reported() {
        let prog = one_block_prog(vec![Instr::LoadConst(Value::int(1u64)), Instr::Return]);
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 1, 1_000_000, GasTable::default());
        let err = interp.run(&prog, None, vec![]).unwrap_err();
        assert_eq!(err.code, codes::OUT_OF_GAS);
    }

    #[test]
    fn stack_underflow_is_a_vm_error() {
        let prog = one_block_prog(vec![Instr::Pop]);
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 10_000, 1_000_000, GasTable::default());
        let err = interp.run(&prog, None, vec![]).unwrap_err();
        assert_eq!(err.code, codes::VM_ERROR);
    }

    #[test]
    fn conditional_jump_selects_branch() {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block {
                label: "entry".to_string(),
                instrs: vec![Instr::LoadConst(Value::Bool(true)), Instr::JumpIfTrue("yes".to_string())],
                fallthrough: None,
            },
        );
        blocks.insert(
            "yes".to_string(),
            Block { label: "yes".to_string(), instrs: vec![Instr::LoadConst(Value::int(1u64)), Instr::Return], fallthrough: None },
        );
        let prog = Prog { entry_label: "entry".to_string(), blocks };
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 10_000, 1_000_000, GasTable::default());
        let result = interp.run(&prog, None, vec![]).unwrap();
        assert_eq!(result.return_value, Value::int(1u64));
    }

    #[test]
    fn fallthrough_off_block_end_is_implicit_return() {
        let prog = one_block_prog(vec![Instr::LoadConst(Value::int(42u64))]);
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 10_000, 1_000_000, GasTable::default());
        let result = interp.run(&prog, None, vec![]).unwrap();
        assert_eq!(result.return_value, Value::int(42u64));
    }

    #[test]
    fn explicit_fallthrough_edge_continues_into_the_next_block() {
        // Mirrors how `lower_if`/`lower_while` seal a block with
        // `fallthrough = Some(next)` and no terminating jump: running off
        // the end of `entry` must land in `next`, not return early.
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block { label: "entry".to_string(), instrs: vec![Instr::LoadConst(Value::int(1u64)), Instr::Pop], fallthrough: Some("next".to_string()) },
        );
        blocks.insert(
            "next".to_string(),
            Block { label: "next".to_string(), instrs: vec![Instr::LoadConst(Value::int(99u64)), Instr::Return], fallthrough: None },
        );
        let prog = Prog { entry_label: "entry".to_string(), blocks };
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 10_000, 1_000_000, GasTable::default());
        let result = interp.run(&prog, None, vec![]).unwrap();
        assert_eq!(result.return_value, Value::int(99u64));
    }

    #[test]
    fn while_loop_runs_to_completion_via_fallthrough_edges() {
        // acc = 0; i = 0; while i < 5 { acc += i; i += 1 }; return acc
        // Built to match codegen.rs's lower_while shape: the pre-loop block
        // falls through into the header with no explicit jump.
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block {
                label: "entry".to_string(),
                instrs: vec![Instr::LoadConst(Value::int(0u64)), Instr::StoreName("acc".to_string()), Instr::LoadConst(Value::int(0u64)), Instr::StoreName("i".to_string())],
                fallthrough: Some("header".to_string()),
            },
        );
        blocks.insert(
            "header".to_string(),
            Block {
                label: "header".to_string(),
                instrs: vec![
                    Instr::LoadName("i".to_string()),
                    Instr::LoadConst(Value::int(5u64)),
                    Instr::Compare(CmpOpKind::Lt),
                    Instr::JumpIfFalse("exit".to_string()),
                ],
                fallthrough: Some("body".to_string()),
            },
        );
        blocks.insert(
            "body".to_string(),
            Block {
                label: "body".to_string(),
                instrs: vec![
                    Instr::LoadName("acc".to_string()),
                    Instr::LoadName("i".to_string()),
                    Instr::BinOp(BinOpKind::Add),
                    Instr::StoreName("acc".to_string()),
                    Instr::LoadName("i".to_string()),
                    Instr::LoadConst(Value::int(1u64)),
                    Instr::BinOp(BinOpKind::Add),
                    Instr::StoreName("i".to_string()),
                    Instr::Jump("header".to_string()),
                ],
                fallthrough: None,
            },
        );
        blocks.insert(
            "exit".to_string(),
            Block { label: "exit".to_string(), instrs: vec![Instr::LoadName("acc".to_string()), Instr::Return], fallthrough: None },
        );
        let prog = Prog { entry_label: "entry".to_string(), blocks };
        let mut host = NullHost::new();
        let mut interp = Interpreter::new(&mut host, 1_000_000, 1_000_000, GasTable::default());
        let result = interp.run(&prog, None, vec![]).unwrap();
        assert_eq!(result.return_value, Value::int(10u64));
    }
}
