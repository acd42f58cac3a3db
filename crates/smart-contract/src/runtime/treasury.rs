//! In-memory balance ledger for local VM runs (spec §4.5). Mirrors
//! `vm_py.runtime.treasury_api`: a simulation-only ledger keyed by
//! fixed-length addresses, with checked non-negative arithmetic capped at
//! `MAX_BALANCE_BITS`. A node embedding this VM in real consensus replaces
//! this with the chain's actual accounting layer.

use animica_vm_core::VmError;
use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::BTreeMap;

/// Matches `treasury_api.py`'s default `_cfg.ADDRESS_LEN`.
pub const ADDRESS_LEN: usize = 32;

fn treasury_error(reason: impl Into<String>) -> VmError {
    VmError::new("validation.arg_limit", reason.into())
}

fn check_addr(addr: &[u8]) -> Result<(), VmError> {
    if addr.len() != ADDRESS_LEN {
        return Err(treasury_error(format!("address must be exactly {ADDRESS_LEN} bytes")));
    }
    Ok(())
}

fn check_amount(amount: &BigUint) -> Result<(), VmError> {
    if amount.bits() > animica_config::MAX_BALANCE_BITS as u64 {
        return Err(treasury_error(format!("amount exceeds {}-bit limit", animica_config::MAX_BALANCE_BITS)));
    }
    Ok(())
}

/// Deterministic, in-process balance ledger: `address -> balance`.
#[derive(Debug, Default)]
pub struct Treasury {
    ledger: BTreeMap<Vec<u8>, BigUint>,
}

impl Treasury {
    pub fn new() -> Self {
        Treasury { ledger: BTreeMap::new() }
    }

    pub fn balance(&self, addr: &[u8]) -> Result<BigUint, VmError> {
        check_addr(addr)?;
        Ok(self.ledger.get(addr).cloned().unwrap_or_else(BigUint::zero))
    }

    pub fn credit(&mut self, addr: &[u8], amount: &BigUint) -> Result<(), VmError> {
        check_addr(addr)?;
        check_amount(amount)?;
        let cur = self.ledger.get(addr).cloned().unwrap_or_else(BigUint::zero);
        let next = cur + amount;
        check_amount(&next)?;
        self.ledger.insert(addr.to_vec(), next);
        Ok(())
    }

    pub fn debit(&mut self, addr: &[u8], amount: &BigUint) -> Result<(), VmError> {
        check_addr(addr)?;
        check_amount(amount)?;
        let cur = self.ledger.get(addr).cloned().unwrap_or_else(BigUint::zero);
        if *amount > cur {
            return Err(treasury_error("insufficient balance"));
        }
        self.ledger.insert(addr.to_vec(), cur - amount);
        Ok(())
    }

    /// Debits `from` and credits `to`; a zero-amount transfer is a no-op.
    pub fn transfer(&mut self, from: &[u8], to: &[u8], amount: &BigUint) -> Result<(), VmError> {
        check_addr(from)?;
        check_addr(to)?;
        check_amount(amount)?;
        if amount.is_zero() {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_address_starts_at_zero() {
        let t = Treasury::new();
        assert_eq!(t.balance(&[0u8; ADDRESS_LEN]).unwrap(), BigUint::zero());
    }

    #[test]
    fn credit_then_transfer() {
        let mut t = Treasury::new();
        let a = [1u8; ADDRESS_LEN];
        let b = [2u8; ADDRESS_LEN];
        t.credit(&a, &BigUint::from(100u32)).unwrap();
        t.transfer(&a, &b, &BigUint::from(40u32)).unwrap();
        assert_eq!(t.balance(&a).unwrap(), BigUint::from(60u32));
        assert_eq!(t.balance(&b).unwrap(), BigUint::from(40u32));
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let mut t = Treasury::new();
        let a = [1u8; ADDRESS_LEN];
        let b = [2u8; ADDRESS_LEN];
        assert!(t.transfer(&a, &b, &BigUint::from(1u32)).is_err());
    }

    #[test]
    fn wrong_length_address_is_rejected() {
        let t = Treasury::new();
        assert!(t.balance(&[0u8; 4]).is_err());
    }
}
