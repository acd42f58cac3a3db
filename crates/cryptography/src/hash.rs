//! Hash functions for the Animica host surface.
//!
//! Mirrors `vm_py.runtime.hash_api`: SHA3-256/512 and optional Keccak256,
//! each with an optional domain-separation prefix. When `domain` is
//! non-empty the hasher absorbs, in order: the 8-byte literal
//! `"\x19animica:"`, the domain bytes, and a single `0x00` separator,
//! before any payload bytes.

use sha3::{Digest, Keccak256, Sha3_256, Sha3_512};

/// Literal prefix absorbed ahead of a non-empty domain tag.
const ANIMICA_PREFIX: &[u8; 9] = b"\x19animica:";

/// Which hash algorithm a caller selected (mirrors `hash_algorithm.rs`'s enum style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha3_256,
    Sha3_512,
    Keccak256,
}

fn absorb_domain<D: Digest>(hasher: &mut D, domain: &[u8]) {
    if domain.is_empty() {
        return;
    }
    hasher.update(ANIMICA_PREFIX);
    hasher.update(domain);
    hasher.update([0u8]);
}

/// SHA3-256 of `data`, optionally domain-separated.
pub fn sha3_256_domain(data: &[u8], domain: &[u8]) -> [u8; 32] {
    let mut h = Sha3_256::new();
    absorb_domain(&mut h, domain);
    h.update(data);
    h.finalize().into()
}

/// SHA3-256 of `data` with no domain separation.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    sha3_256_domain(data, b"")
}

/// SHA3-512 of `data`, optionally domain-separated.
pub fn sha3_512_domain(data: &[u8], domain: &[u8]) -> [u8; 64] {
    let mut h = Sha3_512::new();
    absorb_domain(&mut h, domain);
    h.update(data);
    h.finalize().into()
}

/// SHA3-512 of `data` with no domain separation.
pub fn sha3_512(data: &[u8]) -> [u8; 64] {
    sha3_512_domain(data, b"")
}

/// Keccak-256 of `data` (no domain separation; provided for EVM-adjacent tooling).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(data);
    h.finalize().into()
}

/// A streaming hasher carrying the same domain-prefix semantics as the
/// one-shot functions above, for contracts that hash data incrementally.
pub enum StreamingHasher {
    Sha3_256(Sha3_256),
    Sha3_512(Sha3_512),
    Keccak256(Keccak256),
}

impl StreamingHasher {
    pub fn new(algorithm: HashAlgorithm, domain: &[u8]) -> Self {
        match algorithm {
            HashAlgorithm::Sha3_256 => {
                let mut h = Sha3_256::new();
                absorb_domain(&mut h, domain);
                StreamingHasher::Sha3_256(h)
            }
            HashAlgorithm::Sha3_512 => {
                let mut h = Sha3_512::new();
                absorb_domain(&mut h, domain);
                StreamingHasher::Sha3_512(h)
            }
            HashAlgorithm::Keccak256 => {
                // Keccak never carries domain separation in the host surface.
                StreamingHasher::Keccak256(Keccak256::new())
            }
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHasher::Sha3_256(h) => h.update(data),
            StreamingHasher::Sha3_512(h) => h.update(data),
            StreamingHasher::Keccak256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            StreamingHasher::Sha3_256(h) => h.finalize().to_vec(),
            StreamingHasher::Sha3_512(h) => h.finalize().to_vec(),
            StreamingHasher::Keccak256(h) => h.finalize().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_changes_digest() {
        let a = sha3_256_domain(b"payload", b"demo");
        let b = sha3_256_domain(b"payload", b"demo2");
        let c = sha3_256(b"payload");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_domain_matches_undomained() {
        assert_eq!(sha3_256_domain(b"x", b""), sha3_256(b"x"));
        assert_eq!(sha3_512_domain(b"x", b""), sha3_512(b"x"));
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut s = StreamingHasher::new(HashAlgorithm::Sha3_256, b"demo");
        s.update(b"pay");
        s.update(b"load");
        let streamed = s.finalize();
        assert_eq!(streamed, sha3_256_domain(b"payload", b"demo").to_vec());
    }
}
