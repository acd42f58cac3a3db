//! End-to-end scenarios from the core spec's "testable properties" section:
//! one integration test per concrete scenario, driven through the public
//! `compile`/`load_from_manifest` entry points rather than any single
//! module's internals.

use animica_smart_contract::compiler;
use animica_smart_contract::runtime::loader::load_from_manifest;
use animica_vm_core::Value;

fn manifest_with_code(name: &str, code: &str) -> String {
    format!(r#"{{"name":{name:?},"code":{code:?}}}"#)
}

fn manifest_with_resources(name: &str, code: &str, caps: &[&str], limits_json: &str) -> String {
    let caps_json = serde_json::to_string(caps).unwrap();
    format!(r#"{{"name":{name:?},"code":{code:?},"resources":{{"caps":{caps_json},"limits":{limits_json}}}}}"#)
}

// ---------------------------------------------------------------------------
// Scenario 1: counter
// ---------------------------------------------------------------------------

const COUNTER_SOURCE: &str = r#"
from stdlib import storage, events

def init() -> bytes:
    storage.set_int(b"VALUE", 0)
    return b""

def inc() -> bytes:
    v = storage.get_int(b"VALUE")
    v = v + 1
    storage.set_int(b"VALUE", v)
    events.emit(b"Incremented", value=v)
    return b""

def get() -> bytes:
    v = storage.get_int(b"VALUE")
    return v
"#;

#[test]
fn counter_contract_tracks_state_and_logs_events_in_order() {
    let manifest = manifest_with_code("counter", COUNTER_SOURCE);
    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();

    runtime.call("init", vec![], None, None, None, vec![7u8; 32]).unwrap();
    let get0 = runtime.call("get", vec![], None, None, None, vec![7u8; 32]).unwrap();
    assert_eq!(get0.return_value, Value::int(0u64));

    let inc = runtime.call("inc", vec![], None, None, None, vec![7u8; 32]).unwrap();
    assert_eq!(inc.logs.len(), 1);
    assert_eq!(inc.logs[0].name, b"Incremented");

    let get1 = runtime.call("get", vec![], None, None, None, vec![7u8; 32]).unwrap();
    assert_eq!(get1.return_value, Value::int(1u64));
}

// ---------------------------------------------------------------------------
// Scenario 2: event encoding
// ---------------------------------------------------------------------------

#[test]
fn event_canonical_receipt_matches_spec_example() {
    let source = r#"
from stdlib import events

def go() -> bytes:
    events.emit(b"Demo", bin=b"\x01\x02", n=42, flag=True)
    return b""
"#;
    let manifest = manifest_with_code("demo", source);
    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();
    let result = runtime.call("go", vec![], None, None, None, vec![0u8; 32]).unwrap();
    assert_eq!(result.logs.len(), 1);
    let ev = &result.logs[0];
    assert_eq!(ev.name, b"Demo");
    assert_eq!(ev.args[0].0, "bin");
    assert_eq!(ev.args[1].0, "n");
    assert_eq!(ev.args[1].1, Value::int(42u64));
    assert_eq!(ev.args[2].0, "flag");
}

#[test]
fn empty_event_name_is_rejected() {
    let source = r#"
from stdlib import events

def go() -> bytes:
    events.emit(b"", n=1)
    return b""
"#;
    let manifest = manifest_with_code("demo", source);
    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();
    let err = runtime.call("go", vec![], None, None, None, vec![0u8; 32]).unwrap_err();
    assert_eq!(err.code, "event_invalid");
}

// ---------------------------------------------------------------------------
// Scenario 3: forbidden imports
// ---------------------------------------------------------------------------

#[test]
fn forbidden_imports_are_rejected() {
    let bad_sources = [
        "import os\n",
        "from time import sleep\n",
        "import random\n",
        "from urllib import request\n",
        "from stdlib import *\n",
        "from . import x\n",
    ];
    for src in bad_sources {
        let result = compiler::compile(src, "bad.py", false);
        assert!(result.is_err(), "expected rejection for: {src}");
    }
}

#[test]
fn allowed_stdlib_imports_are_accepted() {
    let src = "from stdlib import storage, events\n\ndef noop() -> bytes:\n    return b\"\"\n";
    let result = compiler::compile(src, "ok.py", false);
    assert!(result.is_ok());
}

// ---------------------------------------------------------------------------
// Scenario 4: gas upper bound
// ---------------------------------------------------------------------------

#[test]
fn execution_stays_within_static_gas_upper_bound() {
    let source = r#"
def loopy() -> bytes:
    i = 0
    acc = 0
    while i < 5:
        acc = acc + i
        i = i + 1
    return acc
"#;
    let manifest = manifest_with_code("loopy", source);
    let compiled = compiler::compile(source, "loopy.py", false).unwrap();
    let prog = compiled.functions.get("loopy").unwrap();
    let table = animica_vm_core::GasTable::default();
    let estimate = animica_smart_contract::compiler::gas_estimator::estimate_prog_gas(prog, &table, Default::default());
    assert!(estimate.total_upper_bound > 0);

    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();
    let result = runtime.call("loopy", vec![], Some(estimate.total_upper_bound + 1), None, None, vec![0u8; 32]).unwrap();
    assert_eq!(result.return_value, Value::int(10u64));
    assert!(result.gas_used <= estimate.total_upper_bound);
}

// ---------------------------------------------------------------------------
// Scenario 5: resource caps
// ---------------------------------------------------------------------------

const BLOB_SOURCE: &str = r#"
from stdlib import syscalls

def pin_two(a: bytes, b: bytes) -> bytes:
    syscalls.blob_pin(0, a)
    return syscalls.blob_pin(0, b)

def pin_three(a: bytes, b: bytes, c: bytes) -> bytes:
    syscalls.blob_pin(0, a)
    syscalls.blob_pin(0, b)
    return syscalls.blob_pin(0, c)
"#;

// Resource-guard counters live for one call session (spec §5), so the
// scenario's "two pins succeed, a third overflows" sequence must happen
// within a single contract call, not across separate `runtime.call()`s.
#[test]
fn blob_pin_accumulates_within_one_call_and_stays_under_budget() {
    let manifest = manifest_with_resources("pinner", BLOB_SOURCE, &["blob.pin"], r#"{"max_blob_bytes":1024}"#);
    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();
    let a = Value::bytes(vec![0u8; 600]);
    let b = Value::bytes(vec![0u8; 424]);
    runtime.call("pin_two", vec![a, b], None, None, None, vec![0u8; 32]).unwrap();
}

#[test]
fn blob_pin_over_budget_fails_with_exact_usage_context() {
    let manifest = manifest_with_resources("pinner", BLOB_SOURCE, &["blob.pin"], r#"{"max_blob_bytes":1024}"#);
    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();
    let a = Value::bytes(vec![0u8; 600]);
    let b = Value::bytes(vec![0u8; 424]);
    let c = Value::bytes(vec![0u8; 1]);
    let err = runtime.call("pin_three", vec![a, b, c], None, None, None, vec![0u8; 32]).unwrap_err();
    assert_eq!(err.code, "resource_exhausted");
    assert_eq!(err.context.get("kind").map(|v| v.to_string()), Some("blob.pin".to_string()));
    assert_eq!(err.context.get("used").map(|v| v.to_string()), Some("1025".to_string()));
    assert_eq!(err.context.get("limit").map(|v| v.to_string()), Some("1024".to_string()));
}

#[test]
fn undeclared_capability_is_denied_regardless_of_limit() {
    let source = r#"
from stdlib import syscalls

def ask(m: bytes, p: bytes) -> bytes:
    return syscalls.ai_enqueue(m, p)
"#;
    // Caps list omits "compute.ai.enqueue" entirely.
    let manifest = manifest_with_resources("asker", source, &[], r#"{"max_ai_units":1000}"#);
    let mut runtime = load_from_manifest(&manifest, &[], false).unwrap();
    let err = runtime.call("ask", vec![Value::bytes(b"m".to_vec()), Value::bytes(b"p".to_vec())], None, None, None, vec![0u8; 32]).unwrap_err();
    assert_eq!(err.code, "capability_denied");
}

// ---------------------------------------------------------------------------
// Scenario 6: PRNG determinism
// ---------------------------------------------------------------------------

#[test]
fn drbg_is_a_pure_function_of_its_seed_inputs() {
    use animica_smart_contract::runtime::random::ContractRandom;
    let tx_hash = [0xAAu8; 32];
    let mut a = ContractRandom::from_tx_seed(&tx_hash, b"contract_addr", b"demo").unwrap();
    let mut b = ContractRandom::from_tx_seed(&tx_hash, b"contract_addr", b"demo").unwrap();
    assert_eq!(a.read(32).unwrap(), b.read(32).unwrap());

    let mut c = ContractRandom::from_tx_seed(&tx_hash, b"contract_addr", b"demo2").unwrap();
    assert_ne!(a.read(32).unwrap(), c.read(32).unwrap());
}
