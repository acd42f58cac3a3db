//! The concrete [`HostDispatch`] implementation: wires storage, the event
//! sink, the resource guard, stdlib dispatch, and calls back into the
//! interpreter for user-defined functions. One instance is built per call
//! session (spec §5: storage/events/treasury/resource-guard counters are
//! per-call unless a host swaps in a shared backend).

use crate::runtime::abi;
use crate::runtime::events::EventSink;
use crate::runtime::hash;
use crate::runtime::random::ContractRandom;
use crate::runtime::resource_guard::ResourceGuard;
use crate::runtime::storage::Storage;
use crate::runtime::syscalls::{CapProvider, LocalNoOpProvider};
use crate::runtime::treasury::Treasury;
use crate::CompiledContract;
use animica_vm::{Event as HostEvent, ExecResult, HostDispatch, Interpreter};
use animica_vm_core::{BlockEnv, GasTable, TxEnv, Value, VmError};
use num_bigint::BigUint;
use num_traits::ToPrimitive;

fn stdlib_error(module: &str, func: &str) -> VmError {
    VmError::new("vm_error", format!("unknown stdlib entry {module}.{func}")).with("module", module.to_string()).with("func", func.to_string())
}

fn arity_error(module: &str, func: &str, expected: &str) -> VmError {
    VmError::new("vm_error", format!("{module}.{func} expects {expected}"))
}

fn expect_bytes(v: &Value, module: &str, func: &str) -> Result<Vec<u8>, VmError> {
    match v {
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err(arity_error(module, func, "bytes")),
    }
}

fn expect_int(v: &Value, module: &str, func: &str) -> Result<BigUint, VmError> {
    match v {
        Value::Int(i) => Ok(i.clone()),
        _ => Err(arity_error(module, func, "int")),
    }
}

fn event_arg_to_value(arg: &crate::runtime::events::EventArg) -> Value {
    match arg {
        crate::runtime::events::EventArg::Bytes(b) => Value::Bytes(b.clone()),
        crate::runtime::events::EventArg::Bool(b) => Value::Bool(*b),
        crate::runtime::events::EventArg::Int(i) => Value::int(i.clone()),
    }
}

/// Splits `args` into positional values and keyword values, preserving the
/// keyword order the caller wrote them in (`events.emit`'s args are an
/// *ordered* mapping per spec §3 — a `BTreeMap` here would silently
/// re-sort event args alphabetically instead of by emission order).
fn zip_args(args: Vec<Value>, kw_names: &[String]) -> (Vec<Value>, Vec<(String, Value)>) {
    let n_kw = kw_names.len();
    let split_at = args.len().saturating_sub(n_kw);
    let mut iter = args.into_iter();
    let positional: Vec<Value> = (&mut iter).take(split_at).collect();
    let kwargs: Vec<(String, Value)> = kw_names.iter().cloned().zip(iter).collect();
    (positional, kwargs)
}

fn kwarg<'a>(kwargs: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// One call session's worth of host state: storage, events, resource
/// guard, randomness, treasury, and syscall provider, plus the compiled
/// contract being executed (for `call_user_func`) and the transaction
/// environment.
pub struct ContractHost<'a> {
    pub contract: &'a CompiledContract,
    pub storage: &'a mut Storage,
    pub events: EventSink,
    pub guard: ResourceGuard,
    pub random: ContractRandom,
    pub treasury: Treasury,
    pub syscalls: Box<dyn CapProvider>,
    pub tx_env: TxEnv,
    /// Stored for forward compatibility with a future block-context stdlib
    /// surface; no stdlib module currently reads it (spec §4.5 lists none).
    pub block_env: BlockEnv,
    pub gas_table: GasTable,
    pub gas_limit: u64,
    pub step_limit: u64,
    pub self_address: Vec<u8>,
    max_event_name_bytes: u64,
    max_event_key_bytes: u64,
    max_event_value_bytes: u64,
    max_logs_per_tx: u64,
    max_call_depth: u32,
    call_depth: u32,
}

impl<'a> ContractHost<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contract: &'a CompiledContract,
        storage: &'a mut Storage,
        guard: ResourceGuard,
        tx_env: TxEnv,
        block_env: BlockEnv,
        gas_table: GasTable,
        gas_limit: u64,
        step_limit: u64,
        self_address: Vec<u8>,
        max_event_name_bytes: u64,
        max_event_key_bytes: u64,
        max_event_value_bytes: u64,
        max_logs_per_tx: u64,
        max_call_depth: u32,
    ) -> Self {
        let random = ContractRandom::from_tx_seed(&tx_env.tx_hash, &self_address, b"").unwrap_or_else(|_| {
            ContractRandom::from_tx_seed(&[0u8; 32], &self_address, b"").expect("fallback seed is never empty")
        });
        ContractHost {
            contract,
            storage,
            events: EventSink::new(),
            guard,
            random,
            treasury: Treasury::new(),
            syscalls: Box::new(LocalNoOpProvider::default()),
            tx_env,
            block_env,
            gas_table,
            gas_limit,
            step_limit,
            self_address,
            max_event_name_bytes,
            max_event_key_bytes,
            max_event_value_bytes,
            max_logs_per_tx,
            max_call_depth,
            call_depth: 0,
        }
    }

    /// Runs `method` with `args` bound positionally to the function's
    /// declared parameter names, returning the call envelope. Nested calls
    /// (via `call_user_func`) share this same counter, so recursive or
    /// mutually-recursive contract functions are bounded by
    /// `ANIMICA_VM_MAX_CALL_DEPTH` instead of overflowing the host stack.
    pub fn call(&mut self, method: &str, args: Vec<Value>) -> Result<ExecResult, VmError> {
        if self.call_depth >= self.max_call_depth {
            return Err(VmError::new("vm_error", format!("call depth exceeded ({})", self.max_call_depth)).with("max_call_depth", self.max_call_depth as u64));
        }
        let func_symbol = self.contract.symbols.resolve_func(method).ok_or_else(|| VmError::new("validation.node_unsupported", format!("unknown method '{method}'")))?;
        if args.len() != func_symbol.params.len() {
            return Err(VmError::new("validation.arg_limit", format!("{method} expects {} args, got {}", func_symbol.params.len(), args.len())));
        }
        let bound: Vec<(String, Value)> = func_symbol.params.iter().cloned().zip(args).collect();
        let prog = self.contract.functions.get(method).ok_or_else(|| VmError::new("validation.node_unsupported", format!("method '{method}' has no compiled body")))?;
        let gas_table = self.gas_table.clone();
        let gas_limit = self.gas_limit;
        let step_limit = self.step_limit;
        self.call_depth += 1;
        let mut interpreter = Interpreter::new(self, gas_limit, step_limit, gas_table);
        let run_result = interpreter.run(prog, None, bound);
        self.call_depth -= 1;
        let mut result = run_result?;
        // The engine's own `logs` field is only ever fed by `emit_event`,
        // which this host never calls (events are recorded directly onto
        // `self.events` from `dispatch_events`). Splice them in here so the
        // result envelope carries the call's emitted events regardless.
        result.logs = self
            .events
            .events()
            .iter()
            .map(|ev| HostEvent { name: ev.name.clone(), args: ev.args.iter().map(|(k, v)| (k.clone(), event_arg_to_value(v))).collect() })
            .collect();
        Ok(result)
    }

    fn dispatch_storage(&mut self, func: &str, positional: &[Value]) -> Result<Value, VmError> {
        match func {
            "get" => {
                let key = expect_bytes(positional.first().ok_or_else(|| arity_error("storage", func, "key"))?, "storage", func)?;
                Ok(match self.storage.get(&key)? {
                    Some(v) => Value::Bytes(v),
                    None => Value::Null,
                })
            }
            "set" => {
                let key = expect_bytes(positional.first().ok_or_else(|| arity_error("storage", func, "key, value"))?, "storage", func)?;
                let value = expect_bytes(positional.get(1).ok_or_else(|| arity_error("storage", func, "key, value"))?, "storage", func)?;
                self.storage.set(&key, &value)?;
                Ok(Value::Null)
            }
            "delete" => {
                let key = expect_bytes(positional.first().ok_or_else(|| arity_error("storage", func, "key"))?, "storage", func)?;
                self.storage.delete(&key)?;
                Ok(Value::Null)
            }
            "exists" => {
                let key = expect_bytes(positional.first().ok_or_else(|| arity_error("storage", func, "key"))?, "storage", func)?;
                Ok(Value::Bool(self.storage.exists(&key)?))
            }
            "get_int" => {
                let key = expect_bytes(positional.first().ok_or_else(|| arity_error("storage", func, "key"))?, "storage", func)?;
                Ok(Value::int(self.storage.get_int(&key)?))
            }
            "set_int" => {
                let key = expect_bytes(positional.first().ok_or_else(|| arity_error("storage", func, "key, value"))?, "storage", func)?;
                let value = expect_int(positional.get(1).ok_or_else(|| arity_error("storage", func, "key, value"))?, "storage", func)?;
                self.storage.set_int(&key, &value)?;
                Ok(Value::Null)
            }
            _ => Err(stdlib_error("storage", func)),
        }
    }

    fn dispatch_events(&mut self, func: &str, positional: &[Value], kwargs: Vec<(String, Value)>) -> Result<Value, VmError> {
        match func {
            "emit" => {
                let name = expect_bytes(positional.first().ok_or_else(|| arity_error("events", func, "name, **kwargs"))?, "events", func)?;
                self.events.emit(&name, kwargs, self.max_event_name_bytes, self.max_event_key_bytes, self.max_event_value_bytes, self.max_logs_per_tx)?;
                Ok(Value::Null)
            }
            _ => Err(stdlib_error("events", func)),
        }
    }

    fn dispatch_hash(&mut self, func: &str, positional: &[Value], kwargs: Vec<(String, Value)>) -> Result<Value, VmError> {
        let data = expect_bytes(positional.first().ok_or_else(|| arity_error("hash", func, "data"))?, "hash", func)?;
        let domain = match kwarg(&kwargs, "domain") {
            Some(v) => expect_bytes(v, "hash", func)?,
            None => Vec::new(),
        };
        match func {
            "sha3_256" => Ok(Value::Bytes(hash::sha3_256(&data, &domain))),
            "sha3_512" => Ok(Value::Bytes(hash::sha3_512(&data, &domain))),
            "keccak256" => Ok(Value::Bytes(hash::keccak_256(&data, &domain)?)),
            _ => Err(stdlib_error("hash", func)),
        }
    }

    fn dispatch_abi(&mut self, func: &str, positional: &[Value], kwargs: Vec<(String, Value)>) -> Result<Value, VmError> {
        match func {
            "require" => {
                let cond = positional.first().ok_or_else(|| arity_error("abi", func, "condition, message?"))?;
                let message = positional.get(1).or_else(|| kwarg(&kwargs, "message"));
                abi::require(cond, message, None)?;
                Ok(Value::Null)
            }
            _ => Err(stdlib_error("abi", func)),
        }
    }

    fn dispatch_treasury(&mut self, func: &str, positional: &[Value]) -> Result<Value, VmError> {
        match func {
            "balance" => {
                let addr = match positional.first() {
                    Some(v) => expect_bytes(v, "treasury", func)?,
                    None => self.self_address.clone(),
                };
                Ok(Value::int(self.treasury.balance(&addr)?))
            }
            "balance_of" => {
                let addr = expect_bytes(positional.first().ok_or_else(|| arity_error("treasury", func, "addr"))?, "treasury", func)?;
                Ok(Value::int(self.treasury.balance(&addr)?))
            }
            "transfer" => {
                let to = expect_bytes(positional.first().ok_or_else(|| arity_error("treasury", func, "to, amount"))?, "treasury", func)?;
                let amount = expect_int(positional.get(1).ok_or_else(|| arity_error("treasury", func, "to, amount"))?, "treasury", func)?;
                self.guard.use_treasury_transfer()?;
                self.treasury.transfer(&self.self_address.clone(), &to, &amount)?;
                Ok(Value::Null)
            }
            _ => Err(stdlib_error("treasury", func)),
        }
    }

    fn dispatch_random(&mut self, func: &str, positional: &[Value]) -> Result<Value, VmError> {
        match func {
            "read" => {
                let n = expect_int(positional.first().ok_or_else(|| arity_error("random", func, "n"))?, "random", func)?;
                let n = n.to_usize().ok_or_else(|| arity_error("random", func, "n (too large)"))?;
                self.guard.use_random_bytes(n as u64)?;
                Ok(Value::Bytes(self.random.read(n)?))
            }
            "u64" => {
                self.guard.use_random_bytes(8)?;
                Ok(Value::int(BigUint::from(self.random.u64())))
            }
            "randrange" => {
                let n = expect_int(positional.first().ok_or_else(|| arity_error("random", func, "n"))?, "random", func)?;
                let n = n.to_u64().ok_or_else(|| arity_error("random", func, "n (too large)"))?;
                self.guard.use_random_bytes(8)?;
                Ok(Value::int(BigUint::from(self.random.randrange(n)?)))
            }
            _ => Err(stdlib_error("random", func)),
        }
    }

    fn dispatch_syscalls(&mut self, func: &str, positional: &[Value]) -> Result<Value, VmError> {
        match func {
            "blob_pin" => {
                let namespace = expect_int(positional.first().ok_or_else(|| arity_error("syscalls", func, "namespace, data"))?, "syscalls", func)?;
                let namespace = namespace.to_u32().ok_or_else(|| arity_error("syscalls", func, "namespace out of range"))?;
                let data = expect_bytes(positional.get(1).ok_or_else(|| arity_error("syscalls", func, "namespace, data"))?, "syscalls", func)?;
                self.guard.use_blob_pin(data.len() as u64)?;
                let result = self.syscalls.blob_pin(namespace, &data)?;
                Ok(Value::Bytes(result.commitment))
            }
            "ai_enqueue" => {
                let model = expect_bytes(positional.first().ok_or_else(|| arity_error("syscalls", func, "model, prompt"))?, "syscalls", func)?;
                let prompt = expect_bytes(positional.get(1).ok_or_else(|| arity_error("syscalls", func, "model, prompt"))?, "syscalls", func)?;
                self.guard.use_ai_units(1)?;
                let result = self.syscalls.ai_enqueue(&model, &prompt)?;
                Ok(Value::Bytes(result.task_id))
            }
            "quantum_enqueue" => {
                let circuit = expect_bytes(positional.first().ok_or_else(|| arity_error("syscalls", func, "circuit, shots"))?, "syscalls", func)?;
                let shots = expect_int(positional.get(1).ok_or_else(|| arity_error("syscalls", func, "circuit, shots"))?, "syscalls", func)?;
                let shots = shots.to_u64().ok_or_else(|| arity_error("syscalls", func, "shots out of range"))?;
                self.guard.use_quantum_units(1)?;
                let result = self.syscalls.quantum_enqueue(&circuit, shots)?;
                Ok(Value::Bytes(result.task_id))
            }
            "read_result" => {
                let task_id = expect_bytes(positional.first().ok_or_else(|| arity_error("syscalls", func, "task_id"))?, "syscalls", func)?;
                let outcome = self.syscalls.read_result(&task_id)?;
                Ok(Value::Bool(outcome.ready))
            }
            "zk_verify" => {
                let circuit = expect_bytes(positional.first().ok_or_else(|| arity_error("syscalls", func, "circuit, proof, public_input"))?, "syscalls", func)?;
                let proof = expect_bytes(positional.get(1).ok_or_else(|| arity_error("syscalls", func, "circuit, proof, public_input"))?, "syscalls", func)?;
                let public_input = expect_bytes(positional.get(2).ok_or_else(|| arity_error("syscalls", func, "circuit, proof, public_input"))?, "syscalls", func)?;
                self.guard.use_zk_verify(1)?;
                let result = self.syscalls.zk_verify(&circuit, &proof, &public_input)?;
                Ok(Value::Bool(result.ok))
            }
            _ => Err(stdlib_error("syscalls", func)),
        }
    }
}

impl<'a> HostDispatch for ContractHost<'a> {
    fn storage_load(&mut self, key: &[u8]) -> Result<Vec<u8>, VmError> {
        Ok(self.storage.get(key)?.unwrap_or_default())
    }

    fn storage_store(&mut self, key: &[u8], value: &[u8]) -> Result<(), VmError> {
        self.storage.set(key, value)
    }

    fn call_stdlib(&mut self, module: &str, func: &str, args: Vec<Value>, kw_names: &[String]) -> Result<Value, VmError> {
        let (positional, kwargs) = zip_args(args, kw_names);
        match module {
            "storage" => self.dispatch_storage(func, &positional),
            "events" => self.dispatch_events(func, &positional, kwargs),
            "hash" => self.dispatch_hash(func, &positional, kwargs),
            "abi" => self.dispatch_abi(func, &positional, kwargs),
            "treasury" => self.dispatch_treasury(func, &positional),
            "random" => self.dispatch_random(func, &positional),
            "syscalls" => self.dispatch_syscalls(func, &positional),
            _ => Err(stdlib_error(module, func)),
        }
    }

    fn call_user_func(&mut self, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
        // Events, storage, and resource-guard usage are all held directly on
        // `self`, so a nested call naturally shares them with the caller.
        Ok(self.call(name, args)?.return_value)
    }

    fn emit_event(&mut self, _event: HostEvent) {
        // Stdlib-originated events are appended directly to `self.events`
        // via `dispatch_events`; the interpreter only calls this for
        // events raised through `HostDispatch` directly, which this host
        // never does (events always flow through `call_stdlib`).
    }

    fn tx_env(&self) -> &TxEnv {
        &self.tx_env
    }
}
