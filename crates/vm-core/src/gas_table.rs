//! Opcode → cost lookup. Loaded once, immutable for the lifetime of a call
//! (spec §3 "Gas Table"). Mirrors `vm_py.compiler.gas_estimator`'s
//! `_DEFAULT_GAS_TABLE`, keyed by the same opcode-category strings so a
//! JSON override file (spec §6 "Gas table file") can target either engine.

use std::collections::BTreeMap;

/// Cost charged for an opcode this table has no entry for. Spec §4.3:
/// "default 1 for unknown".
pub const DEFAULT_UNKNOWN_COST: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasTable {
    costs: BTreeMap<String, u64>,
}

impl GasTable {
    pub fn cost(&self, key: &str) -> u64 {
        self.costs.get(key).copied().unwrap_or(DEFAULT_UNKNOWN_COST)
    }

    /// Overlay `overrides` on top of the built-in defaults; missing keys
    /// keep their default value.
    pub fn with_overrides(overrides: BTreeMap<String, u64>) -> Self {
        let mut table = Self::default();
        table.costs.extend(overrides);
        table
    }

    pub fn call_base(&self) -> u64 {
        self.cost("call_base")
    }

    pub fn call_arg(&self) -> u64 {
        self.cost("call_arg")
    }

    pub fn call_kwarg(&self) -> u64 {
        self.cost("call_kwarg")
    }
}

impl Default for GasTable {
    fn default() -> Self {
        let entries: &[(&str, u64)] = &[
            ("load_const", 2),
            ("load_name", 3),
            ("store_name", 4),
            ("attr_get", 5),
            ("subscript_get", 6),
            ("dup", 1),
            ("pop", 1),
            ("return", 2),
            ("binop_add", 5),
            ("binop_sub", 5),
            ("binop_mul", 8),
            ("binop_floordiv", 12),
            ("binop_mod", 13),
            ("binop_and", 3),
            ("binop_or", 3),
            ("binop_xor", 4),
            ("binop_lshift", 6),
            ("binop_rshift", 6),
            ("unary_pos", 2),
            ("unary_neg", 3),
            ("unary_not", 2),
            ("unary_invert", 3),
            ("cmp_eq", 3),
            ("cmp_ne", 3),
            ("cmp_lt", 4),
            ("cmp_le", 4),
            ("cmp_gt", 4),
            ("cmp_ge", 4),
            ("cmp_in", 6),
            ("cmp_not_in", 6),
            ("cmp_is", 3),
            ("cmp_is_not", 3),
            ("iszero", 2),
            ("byteslen", 2),
            ("cat", 6),
            ("sload", 20),
            ("sstore", 40),
            ("jump", 1),
            ("jump_if", 2),
            ("nop", 0),
            ("call_base", 12),
            ("call_arg", 2),
            ("call_kwarg", 3),
        ];
        GasTable { costs: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_falls_back_to_one() {
        let t = GasTable::default();
        assert_eq!(t.cost("nonexistent"), DEFAULT_UNKNOWN_COST);
    }

    #[test]
    fn overrides_keep_defaults_for_missing_keys() {
        let mut overrides = BTreeMap::new();
        overrides.insert("sstore".to_string(), 999);
        let t = GasTable::with_overrides(overrides);
        assert_eq!(t.cost("sstore"), 999);
        assert_eq!(t.cost("load_const"), 2);
    }
}
