//! Gas meter: monotonic consumption, refund pool applied only at finalize,
//! and snapshot/restore for speculative regions.
//!
//! Mirrors `vm_py.runtime.gasmeter.GasMeter` (spec §4.4).

use crate::error::{codes, VmError};

/// Captured `(used, refund_pool)` pair for speculative regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSnapshot {
    pub used: u64,
    pub refund_pool: u64,
}

/// Per-call gas accounting. `used` never exceeds `limit` once a `consume`
/// call has returned `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
    refund_pool: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        GasMeter { limit, used: 0, refund_pool: 0 }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn refund_pool(&self) -> u64 {
        self.refund_pool
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    /// Charge `n` gas. Leaves state unchanged on failure.
    pub fn consume(&mut self, n: u64) -> Result<(), VmError> {
        let projected = self.used.checked_add(n).ok_or_else(|| {
            VmError::new(codes::OUT_OF_GAS, "gas accounting overflow")
                .with("used", self.used)
                .with("limit", self.limit)
        })?;
        if projected > self.limit {
            return Err(VmError::new(codes::OUT_OF_GAS, "insufficient gas for next charge")
                .with("used", self.used)
                .with("limit", self.limit)
                .with("requested", n));
        }
        self.used = projected;
        log::trace!("gas consume {n}, used={}/{}", self.used, self.limit);
        Ok(())
    }

    /// Queue a refund. Never reduces `used` directly; only applied at `finalize`.
    pub fn refund(&mut self, n: u64) {
        self.refund_pool = self.refund_pool.saturating_add(n);
        log::trace!("gas refund {n} queued, pool={}", self.refund_pool);
    }

    /// Apply the refund pool, capped at `floor(used * max_refund_ratio)`,
    /// and return the effective gas charged for the call.
    ///
    /// # Panics
    /// Panics if `max_refund_ratio` is outside `[0.0, 1.0]`.
    pub fn finalize(&self, max_refund_ratio: f64) -> u64 {
        assert!((0.0..=1.0).contains(&max_refund_ratio), "max_refund_ratio must be in [0,1]");
        let cap = ((self.used as f64) * max_refund_ratio).floor() as u64;
        let applied = self.refund_pool.min(cap);
        self.used - applied
    }

    pub fn snapshot(&self) -> GasSnapshot {
        GasSnapshot { used: self.used, refund_pool: self.refund_pool }
    }

    pub fn restore(&mut self, snap: GasSnapshot) {
        self.used = snap.used;
        self.refund_pool = snap.refund_pool;
    }

    /// Run `f` under a snapshot; on `Err`, the meter is rolled back to the
    /// pre-call state before the error is returned.
    pub fn checkpoint<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snap = self.snapshot();
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.restore(snap);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_never_exceeds_limit() {
        let mut g = GasMeter::new(10);
        assert!(g.consume(7).is_ok());
        assert!(g.consume(4).is_err());
        assert_eq!(g.used(), 7);
    }

    #[test]
    fn refund_only_applies_at_finalize() {
        let mut g = GasMeter::new(100);
        g.consume(40).unwrap();
        g.refund(10);
        assert_eq!(g.used(), 40);
        assert_eq!(g.finalize(1.0), 30);
    }

    #[test]
    fn finalize_caps_refund_by_ratio() {
        let mut g = GasMeter::new(100);
        g.consume(40).unwrap();
        g.refund(1000);
        assert_eq!(g.finalize(0.5), 20);
    }

    #[test]
    fn checkpoint_rolls_back_on_failure() {
        let mut g = GasMeter::new(100);
        g.consume(10).unwrap();
        let result: Result<(), &str> = g.checkpoint(|inner| {
            inner.consume(20).unwrap();
            Err("boom")
        });
        assert!(result.is_err());
        assert_eq!(g.used(), 10);
    }
}
