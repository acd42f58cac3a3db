//! Capability shims the VM's stdlib routes to (spec §4.5, §4.6). Mirrors
//! `vm_py.runtime.syscalls_api`: deterministic, bytes-first facades over
//! data-availability, AI/quantum compute, and ZK verification. The default
//! [`LocalNoOpProvider`] performs input validation and returns deterministic
//! placeholders without touching any network or filesystem — a host wiring
//! this VM into a real capability layer swaps in its own [`CapProvider`].

use animica_cryptography::sha3_256_domain;
use animica_vm_core::VmError;
use std::collections::BTreeMap;

fn syscall_error(reason: impl Into<String>) -> VmError {
    VmError::new("validation.arg_limit", reason.into())
}

fn check_size(buf: &[u8], name: &str, max_input: usize) -> Result<(), VmError> {
    if buf.len() > max_input {
        return Err(syscall_error(format!("{name} too large ({} bytes > {max_input})", buf.len())));
    }
    Ok(())
}

fn task_id(kind: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut preimage = Vec::new();
    preimage.extend_from_slice(kind);
    preimage.push(b'|');
    for p in parts {
        preimage.extend_from_slice(p);
    }
    sha3_256_domain(&preimage, b"cap/task_id/v0").to_vec()
}

#[derive(Debug, Clone)]
pub struct BlobPinResult {
    pub namespace: u32,
    pub size: usize,
    pub commitment: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EnqueueResult {
    pub task_id: Vec<u8>,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
pub struct ReadResultOutcome {
    pub found: bool,
    pub ready: bool,
    pub result: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ZkVerifyResult {
    pub ok: bool,
    pub units: u64,
}

/// Host capability provider, implemented by whatever actually bridges to
/// data availability / compute / ZK backends. Read-only from the
/// contract's perspective.
pub trait CapProvider: Send {
    fn blob_pin(&mut self, namespace: u32, data: &[u8]) -> Result<BlobPinResult, VmError>;
    fn ai_enqueue(&mut self, model: &[u8], prompt: &[u8]) -> Result<EnqueueResult, VmError>;
    fn quantum_enqueue(&mut self, circuit: &[u8], shots: u64) -> Result<EnqueueResult, VmError>;
    fn read_result(&mut self, task_id: &[u8]) -> Result<ReadResultOutcome, VmError>;
    fn zk_verify(&mut self, circuit: &[u8], proof: &[u8], public_input: &[u8]) -> Result<ZkVerifyResult, VmError>;
}

/// Deterministic, side-effect-free stand-in: never persists blobs, never
/// talks to a queue, never verifies proofs.
pub struct LocalNoOpProvider {
    max_input: usize,
    max_queue: usize,
    pending: BTreeMap<Vec<u8>, bool>,
}

impl LocalNoOpProvider {
    pub fn new(max_input: usize, max_queue: usize) -> Self {
        LocalNoOpProvider { max_input, max_queue, pending: BTreeMap::new() }
    }
}

impl Default for LocalNoOpProvider {
    fn default() -> Self {
        LocalNoOpProvider::new(animica_config::SYSCALL_INPUT_MAX, animica_config::SYSCALL_QUEUE_MAX)
    }
}

impl CapProvider for LocalNoOpProvider {
    fn blob_pin(&mut self, namespace: u32, data: &[u8]) -> Result<BlobPinResult, VmError> {
        check_size(data, "data", self.max_input)?;
        let domain = format!("cap/blob_pin/local_stub/ns:{namespace}");
        let commitment = sha3_256_domain(data, domain.as_bytes()).to_vec();
        Ok(BlobPinResult { namespace, size: data.len(), commitment })
    }

    fn ai_enqueue(&mut self, model: &[u8], prompt: &[u8]) -> Result<EnqueueResult, VmError> {
        check_size(model, "model", self.max_input)?;
        check_size(prompt, "prompt", self.max_input)?;
        if self.pending.len() >= self.max_queue {
            return Err(VmError::new("resource_exhausted", "capabilities queue full in local mode"));
        }
        let tid = task_id(b"ai", &[model, b"|", prompt]);
        self.pending.insert(tid.clone(), false);
        Ok(EnqueueResult { task_id: tid, accepted: true })
    }

    fn quantum_enqueue(&mut self, circuit: &[u8], shots: u64) -> Result<EnqueueResult, VmError> {
        check_size(circuit, "circuit", self.max_input)?;
        if shots == 0 || shots > 1_000_000 {
            return Err(syscall_error("shots must be in [1, 1_000_000]"));
        }
        if self.pending.len() >= self.max_queue {
            return Err(VmError::new("resource_exhausted", "capabilities queue full in local mode"));
        }
        let shots_str = shots.to_string();
        let tid = task_id(b"quantum", &[circuit, b"|", shots_str.as_bytes()]);
        self.pending.insert(tid.clone(), false);
        Ok(EnqueueResult { task_id: tid, accepted: true })
    }

    fn read_result(&mut self, task_id: &[u8]) -> Result<ReadResultOutcome, VmError> {
        match self.pending.get(task_id) {
            None => Ok(ReadResultOutcome { found: false, ready: false, result: None }),
            Some(_) => Ok(ReadResultOutcome { found: true, ready: false, result: None }),
        }
    }

    fn zk_verify(&mut self, circuit: &[u8], proof: &[u8], public_input: &[u8]) -> Result<ZkVerifyResult, VmError> {
        check_size(circuit, "circuit", self.max_input)?;
        check_size(proof, "proof", self.max_input)?;
        check_size(public_input, "public_input", self.max_input)?;
        Ok(ZkVerifyResult { ok: false, units: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_pin_returns_deterministic_commitment() {
        let mut p = LocalNoOpProvider::default();
        let a = p.blob_pin(1, b"data").unwrap();
        let b = p.blob_pin(1, b"data").unwrap();
        assert_eq!(a.commitment, b.commitment);
    }

    #[test]
    fn read_result_is_never_ready_in_local_mode() {
        let mut p = LocalNoOpProvider::default();
        let enq = p.ai_enqueue(b"model", b"prompt").unwrap();
        let res = p.read_result(&enq.task_id).unwrap();
        assert!(res.found);
        assert!(!res.ready);
    }

    #[test]
    fn zk_verify_never_accepts_locally() {
        let mut p = LocalNoOpProvider::default();
        let res = p.zk_verify(b"c", b"proof", b"pub").unwrap();
        assert!(!res.ok);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let mut p = LocalNoOpProvider::new(4, 10);
        assert!(p.blob_pin(0, b"too big").is_err());
    }
}
