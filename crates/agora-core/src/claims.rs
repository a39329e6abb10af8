//! Claimable balances.
//!
//! Failed payouts are never allowed to block trade completion; the amount is
//! credited here and the recipient withdraws it later.

use crate::{AccountId, MarketError, Result, Value};
use std::collections::BTreeMap;

/// Per-recipient accrual of amounts whose direct transfer failed.
#[derive(Clone, Debug, Default)]
pub struct ClaimLedger {
    balances: BTreeMap<AccountId, Value>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, account: AccountId, amount: Value) -> Result<()> {
        let slot = self.balances.entry(account).or_insert(0);
        *slot = slot
            .checked_add(amount)
            .ok_or(MarketError::Overflow("claim credit"))?;
        Ok(())
    }

    pub fn balance_of(&self, account: AccountId) -> Value {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Remove and return the full accrued balance. Zero means nothing owed.
    pub fn take(&mut self, account: AccountId) -> Value {
        self.balances.remove(&account).unwrap_or(0)
    }

    /// Sum of all outstanding claims.
    pub fn total_outstanding(&self) -> Value {
        self.balances.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_accumulate() {
        let mut claims = ClaimLedger::new();
        claims.credit(AccountId(1), 10).unwrap();
        claims.credit(AccountId(1), 5).unwrap();
        claims.credit(AccountId(2), 1).unwrap();
        assert_eq!(claims.balance_of(AccountId(1)), 15);
        assert_eq!(claims.total_outstanding(), 16);
    }

    #[test]
    fn take_drains_exactly_once() {
        let mut claims = ClaimLedger::new();
        claims.credit(AccountId(1), 10).unwrap();
        assert_eq!(claims.take(AccountId(1)), 10);
        assert_eq!(claims.take(AccountId(1)), 0);
        assert_eq!(claims.total_outstanding(), 0);
    }

    #[test]
    fn credit_overflow_fails_closed() {
        let mut claims = ClaimLedger::new();
        claims.credit(AccountId(1), Value::MAX).unwrap();
        assert!(claims.credit(AccountId(1), 1).is_err());
        assert_eq!(claims.balance_of(AccountId(1)), Value::MAX);
    }
}
