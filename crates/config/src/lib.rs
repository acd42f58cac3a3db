//! Environment-driven resource limits for the Animica Python-VM core.
//!
//! Every numeric limit named in the external-interfaces section of the core
//! spec is an environment variable with an `ANIMICA_VM_` prefix, a legacy
//! `VM_PY_` fallback, and a hard-coded default. A value that fails to parse
//! or falls outside its sane range is logged and the default is used instead
//! — no environment value can crash the process.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Resolved, immutable resource limits for one process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmLimits {
    /// Reject on first validation/compile warning instead of best-effort recovery.
    pub strict_mode: bool,
    /// Optional path to a JSON gas-table override.
    pub gas_table_path: Option<String>,
    /// Step limit per call (`STEP_LIMIT` in the interpreter spec).
    pub max_ops_per_call: u64,
    /// Maximum nested user-function call depth enforced by `ContractHost`.
    pub max_call_depth: u32,
    /// Maximum accepted contract source size in bytes.
    pub max_code_bytes: u64,
    /// Maximum ABI-encoded call payload size in bytes.
    pub max_abi_payload_bytes: u64,
    /// Maximum return-value size in bytes.
    pub max_return_bytes: u64,
    /// Maximum total bytes across one event's argument values.
    pub max_event_args_bytes: u64,
    /// Maximum storage key size in bytes.
    pub max_storage_key_bytes: u64,
    /// Maximum storage value size in bytes.
    pub max_storage_value_bytes: u64,
    /// Maximum number of events logged per call.
    pub max_logs_per_tx: u64,
    /// Maximum syscall input payload size in bytes.
    pub max_syscall_payload_bytes: u64,
}

impl Default for VmLimits {
    fn default() -> Self {
        Self {
            strict_mode: false,
            gas_table_path: None,
            max_ops_per_call: 1_000_000,
            max_call_depth: 64,
            max_code_bytes: 64 * 1024,
            max_abi_payload_bytes: 64 * 1024,
            max_return_bytes: 16 * 1024,
            max_event_args_bytes: 4 * 1024,
            max_storage_key_bytes: 64,
            max_storage_value_bytes: 128 * 1024,
            max_logs_per_tx: 1024,
            max_syscall_payload_bytes: 1024 * 1024,
        }
    }
}

/// A single env var: new name first, legacy name second, both optional.
struct EnvKey {
    current: &'static str,
    legacy: &'static str,
}

fn read_env(key: &EnvKey) -> Option<String> {
    std::env::var(key.current)
        .ok()
        .or_else(|| std::env::var(key.legacy).ok())
}

fn read_u64(key: EnvKey, default: u64, max_sane: u64) -> u64 {
    match read_env(&key) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(v) if v > 0 && v <= max_sane => v,
            Ok(v) => {
                log::warn!(
                    "{} = {} is out of sane range (0, {}], using default {}",
                    key.current,
                    v,
                    max_sane,
                    default
                );
                default
            }
            Err(_) => {
                log::warn!(
                    "{} = {:?} is not a valid integer, using default {}",
                    key.current,
                    raw,
                    default
                );
                default
            }
        },
    }
}

fn read_bool(key: EnvKey, default: bool) -> bool {
    match read_env(&key) {
        None => default,
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                log::warn!("{} = {:?} is not a valid bool, using default", key.current, raw);
                default
            }
        },
    }
}

impl VmLimits {
    /// Build limits from the process environment, falling back to defaults
    /// for anything unset or out of range.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strict_mode: read_bool(
                EnvKey { current: "ANIMICA_VM_STRICT", legacy: "VM_PY_STRICT" },
                defaults.strict_mode,
            ),
            gas_table_path: read_env(&EnvKey {
                current: "ANIMICA_VM_GAS_TABLE_PATH",
                legacy: "VM_PY_GAS_TABLE_PATH",
            }),
            max_ops_per_call: read_u64(
                EnvKey { current: "ANIMICA_VM_MAX_OPS", legacy: "VM_PY_MAX_OPS" },
                defaults.max_ops_per_call,
                50_000_000,
            ),
            max_call_depth: read_u64(
                EnvKey { current: "ANIMICA_VM_MAX_CALL_DEPTH", legacy: "VM_PY_MAX_CALL_DEPTH" },
                defaults.max_call_depth as u64,
                4096,
            ) as u32,
            max_code_bytes: read_u64(
                EnvKey { current: "ANIMICA_VM_MAX_CODE_BYTES", legacy: "VM_PY_MAX_CODE_BYTES" },
                defaults.max_code_bytes,
                16 * 1024 * 1024,
            ),
            max_abi_payload_bytes: read_u64(
                EnvKey {
                    current: "ANIMICA_VM_MAX_ABI_PAYLOAD_BYTES",
                    legacy: "VM_PY_MAX_ABI_PAYLOAD_BYTES",
                },
                defaults.max_abi_payload_bytes,
                16 * 1024 * 1024,
            ),
            max_return_bytes: read_u64(
                EnvKey { current: "ANIMICA_VM_MAX_RETURN_BYTES", legacy: "VM_PY_MAX_RETURN_BYTES" },
                defaults.max_return_bytes,
                1024 * 1024,
            ),
            max_event_args_bytes: read_u64(
                EnvKey {
                    current: "ANIMICA_VM_MAX_EVENT_ARGS_BYTES",
                    legacy: "VM_PY_MAX_EVENT_ARGS_BYTES",
                },
                defaults.max_event_args_bytes,
                1024 * 1024,
            ),
            max_storage_key_bytes: read_u64(
                EnvKey {
                    current: "ANIMICA_VM_MAX_STORAGE_KEY_BYTES",
                    legacy: "VM_PY_MAX_STORAGE_KEY_BYTES",
                },
                defaults.max_storage_key_bytes,
                4096,
            ),
            max_storage_value_bytes: read_u64(
                EnvKey {
                    current: "ANIMICA_VM_MAX_STORAGE_VALUE_BYTES",
                    legacy: "VM_PY_MAX_STORAGE_VALUE_BYTES",
                },
                defaults.max_storage_value_bytes,
                16 * 1024 * 1024,
            ),
            max_logs_per_tx: read_u64(
                EnvKey { current: "ANIMICA_VM_MAX_LOGS_PER_TX", legacy: "VM_PY_MAX_LOGS_PER_TX" },
                defaults.max_logs_per_tx,
                1_000_000,
            ),
            max_syscall_payload_bytes: read_u64(
                EnvKey {
                    current: "ANIMICA_VM_MAX_SYSCALL_PAYLOAD_BYTES",
                    legacy: "VM_PY_MAX_SYSCALL_PAYLOAD_BYTES",
                },
                defaults.max_syscall_payload_bytes,
                16 * 1024 * 1024,
            ),
        }
    }
}

static GLOBAL_LIMITS: OnceCell<VmLimits> = OnceCell::new();

/// Process-wide cached limits, read from the environment on first access.
pub fn load_config() -> &'static VmLimits {
    GLOBAL_LIMITS.get_or_init(VmLimits::from_env)
}

/// Fixed-width integer modulus used by the interpreter's arithmetic opcodes.
pub const NUMERIC_BIT_WIDTH: u32 = 256;

/// Bit-length cap for treasury ledger balances.
pub const MAX_BALANCE_BITS: u32 = 256;

/// Source validator static caps (spec §4.1).
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;
pub const MAX_AST_NODES: usize = 5000;
pub const MAX_LITERAL_BYTES: usize = 16 * 1024;
pub const MAX_FUNC_ARGS: usize = 8;
pub const MAX_NESTED_FUNC_DEPTH: usize = 4;

/// Host-surface static caps (spec §4.5).
pub const MAX_EVENT_NAME_BYTES: usize = 64;
pub const MAX_EVENT_KEY_BYTES: usize = 64;
pub const MAX_EVENT_VALUE_BYTES: usize = 4 * 1024;
pub const SYSCALL_INPUT_MAX: usize = 1024 * 1024;
pub const SYSCALL_QUEUE_MAX: usize = 1024;

/// Interpreter default step limit, resolved dynamically via [`load_config`].
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Default static-gas-estimator loop unroll bound (spec §4.2).
pub const DEFAULT_LOOP_UNROLL: u32 = 8;
/// Default static-gas-estimator explored-state safeguard (spec §4.2).
pub const DEFAULT_MAX_ESTIMATOR_STATES: u64 = 200_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let d = VmLimits::default();
        assert_eq!(d.max_ops_per_call, 1_000_000);
        assert_eq!(d.max_storage_value_bytes, 128 * 1024);
        assert_eq!(d.max_storage_key_bytes, 64);
        assert!(!d.strict_mode);
    }

    #[test]
    fn out_of_range_falls_back_to_default() {
        std::env::set_var("ANIMICA_VM_MAX_OPS", "not_a_number");
        let limits = VmLimits::from_env();
        assert_eq!(limits.max_ops_per_call, 1_000_000);
        std::env::remove_var("ANIMICA_VM_MAX_OPS");
    }

    #[test]
    fn legacy_env_name_is_honored_when_current_is_absent() {
        std::env::remove_var("ANIMICA_VM_MAX_CODE_BYTES");
        std::env::set_var("VM_PY_MAX_CODE_BYTES", "2048");
        let limits = VmLimits::from_env();
        assert_eq!(limits.max_code_bytes, 2048);
        std::env::remove_var("VM_PY_MAX_CODE_BYTES");
    }
}
