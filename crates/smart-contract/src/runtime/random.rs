//! Deterministic contract-facing PRNG (spec §4.5). Mirrors
//! `vm_py.runtime.random_api`: a `Drbg` seeded from the transaction hash,
//! plus bounded `read`/`u64`/`randrange` helpers. Not a source of
//! cryptographic or consensus randomness.

use animica_cryptography::Drbg;
use animica_vm_core::VmError;

/// 16 MiB per-call guard, matching `_MAX_REQUEST` in the source.
const MAX_REQUEST: usize = 1 << 24;

fn random_error(reason: impl Into<String>) -> VmError {
    VmError::new("validation.arg_limit", reason.into())
}

/// Thin wrapper giving contracts a validated `read`/`u64`/`randrange`
/// surface over a per-call `Drbg` instance.
pub struct ContractRandom {
    drbg: Drbg,
}

impl ContractRandom {
    pub fn from_tx_seed(tx_hash: &[u8], caller: &[u8], salt: &[u8]) -> Result<Self, VmError> {
        if tx_hash.is_empty() {
            return Err(random_error("tx_hash must be non-empty"));
        }
        Ok(ContractRandom { drbg: Drbg::from_tx_seed(tx_hash, caller, salt) })
    }

    pub fn read(&mut self, n: usize) -> Result<Vec<u8>, VmError> {
        if n > MAX_REQUEST {
            return Err(random_error(format!("n must be <= {MAX_REQUEST} (got {n})")));
        }
        Ok(self.drbg.read(n))
    }

    pub fn u64(&mut self) -> u64 {
        self.drbg.u64()
    }

    pub fn randrange(&mut self, n: u64) -> Result<u64, VmError> {
        if n == 0 {
            return Err(random_error("n must be >= 1"));
        }
        Ok(self.drbg.randrange(n))
    }

    pub fn fork(&mut self, label: &[u8]) -> ContractRandom {
        ContractRandom { drbg: self.drbg.fork(label) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_reproducible() {
        let mut a = ContractRandom::from_tx_seed(&[1u8; 32], b"c", b"s").unwrap();
        let mut b = ContractRandom::from_tx_seed(&[1u8; 32], b"c", b"s").unwrap();
        assert_eq!(a.read(16).unwrap(), b.read(16).unwrap());
    }

    #[test]
    fn empty_tx_hash_is_rejected() {
        assert!(ContractRandom::from_tx_seed(&[], b"c", b"s").is_err());
    }

    #[test]
    fn oversized_read_is_rejected() {
        let mut r = ContractRandom::from_tx_seed(&[1u8; 32], b"c", b"s").unwrap();
        assert!(r.read(MAX_REQUEST + 1).is_err());
    }

    #[test]
    fn randrange_zero_is_rejected() {
        let mut r = ContractRandom::from_tx_seed(&[1u8; 32], b"c", b"s").unwrap();
        assert!(r.randrange(0).is_err());
    }
}
