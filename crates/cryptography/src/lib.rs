//! Domain-separated hashing and a deterministic counter-mode DRBG for the
//! Animica Python-VM core.
//!
//! Every hash primitive contracts can reach is routed through domain
//! separation so that two different logical uses of SHA3-256 (e.g. a
//! storage-key hint vs. a contract-level `hash.sha3_256` call) can never
//! collide on the same preimage.

pub mod drbg;
pub mod hash;

pub use drbg::Drbg;
pub use hash::{keccak256, sha3_256, sha3_256_domain, sha3_512, sha3_512_domain, HashAlgorithm, StreamingHasher};
