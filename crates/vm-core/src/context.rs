//! Deterministic per-block/per-transaction environments passed into the
//! engine. Pure data only — no wall-clock access, mirroring
//! `vm_py.runtime.context`.

use crate::error::{ContextValue, VmError};

fn require_non_negative(name: &str, v: i128) -> Result<u64, VmError> {
    if v < 0 {
        return Err(VmError::new("vm_error", format!("{name} must be non-negative"))
            .with("field", name.to_string())
            .with("value", ContextValue::Int(v as i64)));
    }
    Ok(v as u64)
}

/// Deterministic per-block environment (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEnv {
    pub height: u64,
    pub timestamp: u64,
    pub coinbase: Vec<u8>,
    pub chain_id: u64,
}

impl BlockEnv {
    pub fn new(height: u64, timestamp: u64, coinbase: Vec<u8>, chain_id: u64) -> Self {
        BlockEnv { height, timestamp, coinbase, chain_id }
    }

    /// Build from signed inputs, validating non-negativity the way the
    /// source's `_require_non_negative_int` does before narrowing to `u64`.
    pub fn from_signed(height: i128, timestamp: i128, coinbase: Vec<u8>, chain_id: i128) -> Result<Self, VmError> {
        Ok(BlockEnv {
            height: require_non_negative("height", height)?,
            timestamp: require_non_negative("timestamp", timestamp)?,
            coinbase,
            chain_id: require_non_negative("chain_id", chain_id)?,
        })
    }
}

/// Deterministic per-transaction environment (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEnv {
    pub tx_hash: Vec<u8>,
    pub sender: Vec<u8>,
    pub to: Option<Vec<u8>>,
    pub value: u64,
    pub gas_limit: u64,
    pub nonce: u64,
}

impl TxEnv {
    pub fn new(
        tx_hash: Vec<u8>,
        sender: Vec<u8>,
        to: Option<Vec<u8>>,
        value: u64,
        gas_limit: u64,
        nonce: u64,
    ) -> Self {
        TxEnv { tx_hash, sender, to, value, gas_limit, nonce }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_height_is_rejected() {
        let e = BlockEnv::from_signed(-1, 0, vec![], 1).unwrap_err();
        assert_eq!(e.code, "vm_error");
    }

    #[test]
    fn valid_signed_inputs_build() {
        let b = BlockEnv::from_signed(10, 20, vec![1, 2, 3], 7).unwrap();
        assert_eq!(b.height, 10);
        assert_eq!(b.chain_id, 7);
    }
}
