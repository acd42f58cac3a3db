//! Contract-facing hashing surface (spec §4.5). Mirrors
//! `vm_py.runtime.hash_api`: thin, validating wrappers over
//! `animica-cryptography`'s domain-separated hash functions.

use animica_cryptography::{keccak256, sha3_256_domain, sha3_512_domain};
use animica_vm_core::VmError;

pub fn sha3_256(data: &[u8], domain: &[u8]) -> Vec<u8> {
    sha3_256_domain(data, domain).to_vec()
}

pub fn sha3_512(data: &[u8], domain: &[u8]) -> Vec<u8> {
    sha3_512_domain(data, domain).to_vec()
}

/// Keccak-256 never carries domain separation at the host surface (matches
/// `hash_api.py`'s `keccak256`, which ignores `domain` beyond validating it).
pub fn keccak_256(data: &[u8], domain: &[u8]) -> Result<Vec<u8>, VmError> {
    let _ = domain;
    Ok(keccak256(data).to_vec())
}

pub fn hash_concat_sha3_256(chunks: &[Vec<u8>], domain: &[u8]) -> Vec<u8> {
    let joined: Vec<u8> = chunks.iter().flatten().copied().collect();
    sha3_256(&joined, domain)
}

pub fn hash_concat_sha3_512(chunks: &[Vec<u8>], domain: &[u8]) -> Vec<u8> {
    let joined: Vec<u8> = chunks.iter().flatten().copied().collect();
    sha3_512(&joined, domain)
}

pub fn hash_concat_keccak256(chunks: &[Vec<u8>], domain: &[u8]) -> Result<Vec<u8>, VmError> {
    let joined: Vec<u8> = chunks.iter().flatten().copied().collect();
    keccak_256(&joined, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_256_domain_changes_digest() {
        let a = sha3_256(b"x", b"demo");
        let b = sha3_256(b"x", b"");
        assert_ne!(a, b);
    }

    #[test]
    fn concat_matches_joined_input() {
        let chunks = vec![b"foo".to_vec(), b"bar".to_vec()];
        assert_eq!(hash_concat_sha3_256(&chunks, b""), sha3_256(b"foobar", b""));
    }

    #[test]
    fn keccak_is_available() {
        let h = keccak_256(b"data", b"").unwrap();
        assert_eq!(h.len(), 32);
    }
}
