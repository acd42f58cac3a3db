//! Event emission and canonical receipt encoding (spec §4.5). Mirrors
//! `vm_py.runtime.events_api`: validated name/args, converted to the
//! canonical `{name, args:[{k,t,v}]}` receipt shape at the end of a call.

use animica_vm_core::{ContextValue, Value, VmError};
use once_cell::sync::Lazy;
use regex::Regex;

static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

fn event_error(reason: impl Into<String>, place: &str) -> VmError {
    VmError::new("event_invalid", reason.into()).with("where", place.to_string())
}

/// One argument value of an emitted event, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventArg {
    Bytes(Vec<u8>),
    Bool(bool),
    Int(num_bigint::BigUint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub name: Vec<u8>,
    pub args: Vec<(String, EventArg)>,
}

/// `{name: "0x"+hex, args: [{"k","t","v"}]}`, the exact shape a receipt
/// serializes (`t` is `"b"`/`"z"`/`"i"`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CanonicalEvent {
    pub name: String,
    pub args: Vec<CanonicalArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CanonicalArg {
    pub k: String,
    pub t: &'static str,
    pub v: serde_json::Value,
}

/// `v` for an int arg is a JSON number (spec §6, §8 scenario 2), not a
/// string, matching `events_api.py`'s `"v": int(v)`. `serde_json::Number`
/// only natively holds `u64`/`i64`/`f64`, so with `arbitrary_precision`
/// enabled we parse the decimal digits straight into a `Number` to keep
/// full 256-bit precision instead of lossily routing through `f64`.
fn int_to_json_number(i: &num_bigint::BigUint) -> serde_json::Value {
    let digits = i.to_string();
    let number: serde_json::Number = serde_json::from_str(&digits).expect("decimal digit string is always a valid JSON number");
    serde_json::Value::Number(number)
}

fn check_name(name: &[u8], max_name_bytes: u64) -> Result<(), VmError> {
    if name.is_empty() {
        return Err(event_error("event name must be non-empty", "name_empty"));
    }
    if name.len() as u64 > max_name_bytes {
        return Err(event_error("event name too long", "name_length").with("len", name.len()));
    }
    Ok(())
}

fn check_key(key: &str, max_key_bytes: u64) -> Result<(), VmError> {
    if key.is_empty() {
        return Err(event_error("event key must be non-empty", "key_empty"));
    }
    if key.len() as u64 > max_key_bytes {
        return Err(event_error("event key too long", "key_length").with("len", key.len()));
    }
    if !KEY_RE.is_match(key) {
        return Err(event_error("event key has invalid characters", "key_grammar").with("key", key.to_string()));
    }
    Ok(())
}

fn check_value(value: &Value, max_value_bytes: u64) -> Result<EventArg, VmError> {
    match value {
        Value::Bytes(b) => {
            if b.len() as u64 > max_value_bytes {
                return Err(event_error("event bytes arg too long", "value_bytes_length").with("len", b.len()));
            }
            Ok(EventArg::Bytes(b.clone()))
        }
        Value::Bool(b) => Ok(EventArg::Bool(*b)),
        Value::Int(i) => {
            if i.bits() > animica_config::MAX_BALANCE_BITS as u64 {
                return Err(event_error("event int arg out of range", "value_int_bits").with("bits", i.bits()));
            }
            Ok(EventArg::Int(i.clone()))
        }
        Value::Null => Err(event_error("unsupported event arg type: null", "value_type")),
    }
}

/// Accumulates events emitted during one call. `max_events` mirrors
/// `VmLimits::max_logs_per_tx`.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<EmittedEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        EventSink { events: Vec::new() }
    }

    pub fn emit(
        &mut self,
        name: &[u8],
        args: Vec<(String, Value)>,
        max_name_bytes: u64,
        max_key_bytes: u64,
        max_value_bytes: u64,
        max_events: u64,
    ) -> Result<(), VmError> {
        if self.events.len() as u64 >= max_events {
            return Err(VmError::new("resource_exhausted", "too many events logged").with("kind", "events").with("limit", max_events));
        }
        check_name(name, max_name_bytes)?;
        let mut checked = Vec::with_capacity(args.len());
        for (k, v) in args {
            check_key(&k, max_key_bytes)?;
            let arg = check_value(&v, max_value_bytes)?;
            checked.push((k, arg));
        }
        self.events.push(EmittedEvent { name: name.to_vec(), args: checked });
        Ok(())
    }

    pub fn events(&self) -> &[EmittedEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn into_canonical(self) -> Vec<CanonicalEvent> {
        self.events
            .into_iter()
            .map(|ev| CanonicalEvent {
                name: format!("0x{}", hex::encode(&ev.name)),
                args: ev
                    .args
                    .into_iter()
                    .map(|(k, v)| match v {
                        EventArg::Bytes(b) => CanonicalArg { k, t: "b", v: serde_json::Value::String(format!("0x{}", hex::encode(&b))) },
                        EventArg::Bool(b) => CanonicalArg { k, t: "z", v: serde_json::Value::Bool(b) },
                        EventArg::Int(i) => CanonicalArg { k, t: "i", v: int_to_json_number(&i) },
                    })
                    .collect(),
            })
            .collect()
    }
}

impl From<&EventArg> for ContextValue {
    fn from(v: &EventArg) -> Self {
        match v {
            EventArg::Bytes(b) => ContextValue::Str(hex::encode(b)),
            EventArg::Bool(b) => ContextValue::Bool(*b),
            EventArg::Int(i) => ContextValue::Str(i.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn emit_validates_and_records() {
        let mut sink = EventSink::new();
        sink.emit(b"Transfer", vec![("amount".to_string(), Value::int(BigUint::from(5u8)))], 64, 64, 4096, 1024).unwrap();
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn invalid_key_characters_are_rejected() {
        let mut sink = EventSink::new();
        let err = sink.emit(b"Transfer", vec![("bad-key".to_string(), Value::Bool(true))], 64, 64, 4096, 1024);
        assert!(err.is_err());
    }

    #[test]
    fn arg_order_matches_emission_order_not_alphabetical() {
        let mut sink = EventSink::new();
        sink.emit(
            b"Demo",
            vec![
                ("bin".to_string(), Value::Bytes(vec![1, 2])),
                ("n".to_string(), Value::int(BigUint::from(42u8))),
                ("flag".to_string(), Value::Bool(true)),
            ],
            64,
            64,
            4096,
            1024,
        )
        .unwrap();
        let canonical = sink.into_canonical();
        let keys: Vec<&str> = canonical[0].args.iter().map(|a| a.k.as_str()).collect();
        assert_eq!(keys, vec!["bin", "n", "flag"]);
    }

    #[test]
    fn canonical_encoding_tags_each_arg_type() {
        let mut sink = EventSink::new();
        sink.emit(
            b"E",
            vec![("a".to_string(), Value::Bytes(vec![1, 2])), ("b".to_string(), Value::Bool(true)), ("c".to_string(), Value::int(BigUint::from(7u8)))],
            64,
            64,
            4096,
            1024,
        )
        .unwrap();
        let canonical = sink.into_canonical();
        assert_eq!(canonical[0].name, "0x45");
        let types: Vec<&str> = canonical[0].args.iter().map(|a| a.t).collect();
        assert_eq!(types, vec!["b", "z", "i"]);
    }

    #[test]
    fn int_args_encode_as_json_numbers_not_strings() {
        let mut sink = EventSink::new();
        sink.emit(b"Demo", vec![("n".to_string(), Value::int(BigUint::from(42u8)))], 64, 64, 4096, 1024).unwrap();
        let canonical = sink.into_canonical();
        assert_eq!(canonical[0].args[0].v, serde_json::json!(42));
        assert_eq!(serde_json::to_string(&canonical[0].args[0].v).unwrap(), "42");
    }

    #[test]
    fn large_int_args_keep_full_precision_as_a_json_number() {
        let mut sink = EventSink::new();
        let big = BigUint::from(2u8).pow(200);
        sink.emit(b"Demo", vec![("n".to_string(), Value::Int(big.clone()))], 64, 64, 4096, 1024).unwrap();
        let canonical = sink.into_canonical();
        assert!(canonical[0].args[0].v.is_number());
        assert_eq!(serde_json::to_string(&canonical[0].args[0].v).unwrap(), big.to_string());
    }
}
