//! Manifest-declared capability and resource-cap enforcement (spec §4.6).
//! Mirrors `vm_py.runtime.resource_caps`: a per-execution guard the host
//! calls before dispatching to storage/syscalls/treasury/random, raising a
//! `capability_denied` or `resource_exhausted` `VmError` when a contract
//! oversteps what its manifest declared.

use animica_vm_core::VmError;
use std::collections::BTreeSet;

pub const CAP_BLOB_PIN: &str = "blob.pin";
pub const CAP_AI_ENQUEUE: &str = "compute.ai.enqueue";
pub const CAP_QUANTUM_ENQUEUE: &str = "compute.quantum.enqueue";
pub const CAP_RESULT_READ: &str = "compute.result.read";
pub const CAP_ZK_VERIFY: &str = "zk.verify";
pub const CAP_RANDOM_READ: &str = "random.read";
pub const CAP_TREASURY_TRANSFER: &str = "treasury.transfer";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_blob_bytes: u64,
    pub max_ai_units: u64,
    pub max_quantum_units: u64,
    pub max_zk_proofs: u64,
    pub max_random_bytes: u64,
    pub max_treasury_transfers: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub blob_bytes: u64,
    pub ai_units: u64,
    pub quantum_units: u64,
    pub zk_proofs: u64,
    pub random_bytes: u64,
    pub treasury_transfers: u64,
}

fn capability_denied(cap: &str) -> VmError {
    VmError::new("capability_denied", format!("capability denied: {cap}")).with("cap", cap.to_string())
}

fn resource_exhausted(kind: &str, used: u64, limit: u64) -> VmError {
    VmError::new("resource_exhausted", format!("resource exhausted for {kind}: used {used} > limit {limit}"))
        .with("kind", kind.to_string())
        .with("used", used)
        .with("limit", limit)
}

/// Per-execution (typically per-call or per-tx, host's choice) capability
/// and resource-cap enforcer, built from a contract's manifest.
#[derive(Debug, Clone, Default)]
pub struct ResourceGuard {
    pub limits: ResourceLimits,
    pub usage: ResourceUsage,
    pub caps: BTreeSet<String>,
}

impl ResourceGuard {
    pub fn new(limits: ResourceLimits, caps: BTreeSet<String>) -> Self {
        ResourceGuard { limits, usage: ResourceUsage::default(), caps }
    }

    fn require_cap(&self, cap: &str) -> Result<(), VmError> {
        if self.caps.contains(cap) {
            Ok(())
        } else {
            Err(capability_denied(cap))
        }
    }

    pub fn use_blob_pin(&mut self, n_bytes: u64) -> Result<(), VmError> {
        if n_bytes == 0 {
            return Ok(());
        }
        self.require_cap(CAP_BLOB_PIN)?;
        let next = self.usage.blob_bytes + n_bytes;
        if next > self.limits.max_blob_bytes {
            return Err(resource_exhausted(CAP_BLOB_PIN, next, self.limits.max_blob_bytes));
        }
        self.usage.blob_bytes = next;
        Ok(())
    }

    pub fn use_ai_units(&mut self, units: u64) -> Result<(), VmError> {
        if units == 0 {
            return Ok(());
        }
        self.require_cap(CAP_AI_ENQUEUE)?;
        let next = self.usage.ai_units + units;
        if next > self.limits.max_ai_units {
            return Err(resource_exhausted(CAP_AI_ENQUEUE, next, self.limits.max_ai_units));
        }
        self.usage.ai_units = next;
        Ok(())
    }

    pub fn use_quantum_units(&mut self, units: u64) -> Result<(), VmError> {
        if units == 0 {
            return Ok(());
        }
        self.require_cap(CAP_QUANTUM_ENQUEUE)?;
        let next = self.usage.quantum_units + units;
        if next > self.limits.max_quantum_units {
            return Err(resource_exhausted(CAP_QUANTUM_ENQUEUE, next, self.limits.max_quantum_units));
        }
        self.usage.quantum_units = next;
        Ok(())
    }

    pub fn use_zk_verify(&mut self, proofs: u64) -> Result<(), VmError> {
        if proofs == 0 {
            return Ok(());
        }
        self.require_cap(CAP_ZK_VERIFY)?;
        let next = self.usage.zk_proofs + proofs;
        if next > self.limits.max_zk_proofs {
            return Err(resource_exhausted(CAP_ZK_VERIFY, next, self.limits.max_zk_proofs));
        }
        self.usage.zk_proofs = next;
        Ok(())
    }

    pub fn use_random_bytes(&mut self, n_bytes: u64) -> Result<(), VmError> {
        if n_bytes == 0 {
            return Ok(());
        }
        self.require_cap(CAP_RANDOM_READ)?;
        let next = self.usage.random_bytes + n_bytes;
        if next > self.limits.max_random_bytes {
            return Err(resource_exhausted(CAP_RANDOM_READ, next, self.limits.max_random_bytes));
        }
        self.usage.random_bytes = next;
        Ok(())
    }

    pub fn use_treasury_transfer(&mut self) -> Result<(), VmError> {
        self.require_cap(CAP_TREASURY_TRANSFER)?;
        let next = self.usage.treasury_transfers + 1;
        if next > self.limits.max_treasury_transfers {
            return Err(resource_exhausted(CAP_TREASURY_TRANSFER, next, self.limits.max_treasury_transfers));
        }
        self.usage.treasury_transfers = next;
        Ok(())
    }

    /// `read_result` (`compute.result.read`) is deliberately not
    /// capability-gated: reading a previously enqueued result is always
    /// permitted once the enqueue itself succeeded, so callers never call
    /// into this guard for it.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard_with(cap: &str, limit_field: impl Fn(&mut ResourceLimits, u64)) -> ResourceGuard {
        let mut limits = ResourceLimits::default();
        limit_field(&mut limits, 100);
        let mut caps = BTreeSet::new();
        caps.insert(cap.to_string());
        ResourceGuard::new(limits, caps)
    }

    #[test]
    fn undeclared_capability_is_denied() {
        let mut g = ResourceGuard::default();
        assert!(g.use_blob_pin(1).is_err());
    }

    #[test]
    fn declared_capability_within_limit_succeeds() {
        let mut g = guard_with(CAP_BLOB_PIN, |l, n| l.max_blob_bytes = n);
        g.use_blob_pin(50).unwrap();
        assert_eq!(g.usage.blob_bytes, 50);
    }

    #[test]
    fn exceeding_limit_is_rejected() {
        let mut g = guard_with(CAP_AI_ENQUEUE, |l, n| l.max_ai_units = n);
        g.use_ai_units(60).unwrap();
        assert!(g.use_ai_units(60).is_err());
    }

    #[test]
    fn zero_cost_calls_never_touch_caps() {
        let mut g = ResourceGuard::default();
        g.use_blob_pin(0).unwrap();
    }
}
