//! Deterministic key/value storage (spec §4.5). Mirrors
//! `vm_py.runtime.storage_api`: a pluggable backend behind length-capped
//! get/set/delete/exists, plus big-endian unsigned integer helpers.

use animica_vm_core::VmError;
use num_bigint::BigUint;
use num_traits::Zero;

/// Pluggable storage backend. The default is an in-memory map; a host
/// embedding the interpreter in a real chain would swap in a state-DB-backed
/// implementation.
pub trait StorageBackend: Send {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
    fn exists(&self, key: &[u8]) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: std::collections::BTreeMap<Vec<u8>, Vec<u8>>,
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.get(key).cloned()
    }
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.store.insert(key.to_vec(), value.to_vec());
    }
    fn delete(&mut self, key: &[u8]) {
        self.store.remove(key);
    }
    fn exists(&self, key: &[u8]) -> bool {
        self.store.contains_key(key)
    }
}

fn storage_error(reason: impl Into<String>) -> VmError {
    VmError::new("storage_invalid", reason.into())
}

/// Contract-facing storage surface: a backend plus the key/value length
/// caps from `animica_config::VmLimits`.
pub struct Storage {
    backend: Box<dyn StorageBackend>,
    max_key_bytes: u64,
    max_value_bytes: u64,
}

impl Storage {
    pub fn new(backend: Box<dyn StorageBackend>, max_key_bytes: u64, max_value_bytes: u64) -> Self {
        Storage { backend, max_key_bytes, max_value_bytes }
    }

    pub fn with_memory_backend(max_key_bytes: u64, max_value_bytes: u64) -> Self {
        Storage::new(Box::new(MemoryBackend::default()), max_key_bytes, max_value_bytes)
    }

    fn check_key(&self, key: &[u8]) -> Result<(), VmError> {
        if key.is_empty() {
            return Err(storage_error("storage key must be non-empty"));
        }
        if key.len() as u64 > self.max_key_bytes {
            return Err(storage_error(format!("storage key too long (>{} bytes)", self.max_key_bytes)).with("limit", self.max_key_bytes));
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<(), VmError> {
        if value.len() as u64 > self.max_value_bytes {
            return Err(storage_error(format!("storage value too large (>{} bytes)", self.max_value_bytes)).with("limit", self.max_value_bytes));
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, VmError> {
        self.check_key(key)?;
        Ok(self.backend.get(key))
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), VmError> {
        self.check_key(key)?;
        self.check_value(value)?;
        self.backend.set(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), VmError> {
        self.check_key(key)?;
        self.backend.delete(key);
        Ok(())
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool, VmError> {
        self.check_key(key)?;
        Ok(self.backend.exists(key))
    }

    /// Reads a big-endian unsigned integer; an unset key reads as zero.
    pub fn get_int(&self, key: &[u8]) -> Result<BigUint, VmError> {
        match self.get(key)? {
            None => Ok(BigUint::zero()),
            Some(raw) if raw.is_empty() => Ok(BigUint::zero()),
            Some(raw) => Ok(BigUint::from_bytes_be(&raw)),
        }
    }

    /// Stores `value` as a minimal-length big-endian unsigned integer
    /// (zero encodes as a single `0x00` byte), enforcing the U256 range.
    pub fn set_int(&mut self, key: &[u8], value: &BigUint) -> Result<(), VmError> {
        if value.bits() > animica_config::MAX_BALANCE_BITS as u64 {
            return Err(storage_error("set_int value does not fit in 256 bits"));
        }
        let encoded = if value.is_zero() { vec![0u8] } else { value.to_bytes_be() };
        self.set(key, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        Storage::with_memory_backend(64, 128 * 1024)
    }

    #[test]
    fn round_trips_bytes() {
        let mut s = storage();
        s.set(b"k", b"v").unwrap();
        assert_eq!(s.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(s.exists(b"k").unwrap());
        s.delete(b"k").unwrap();
        assert_eq!(s.get(b"k").unwrap(), None);
    }

    #[test]
    fn oversized_key_is_rejected() {
        let s = storage();
        let key = vec![0u8; 65];
        assert!(s.get(&key).is_err());
    }

    #[test]
    fn get_int_defaults_to_zero() {
        let s = storage();
        assert_eq!(s.get_int(b"missing").unwrap(), BigUint::zero());
    }

    #[test]
    fn set_int_round_trips_minimally_encoded() {
        let mut s = storage();
        s.set_int(b"n", &BigUint::from(0u8)).unwrap();
        assert_eq!(s.get(b"n").unwrap(), Some(vec![0u8]));
        s.set_int(b"n", &BigUint::from(300u32)).unwrap();
        assert_eq!(s.get_int(b"n").unwrap(), BigUint::from(300u32));
    }
}
