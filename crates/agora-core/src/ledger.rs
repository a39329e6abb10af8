//! Capability surface the engine consumes on the external SFT ledger.
//!
//! The ledger is authoritative for unit balances. The engine only requires
//! balance queries, operator-gated transfers, and an optional EIP-2981-style
//! royalty lookup; everything else about the ledger (URI storage, metadata,
//! mint rules) is out of scope.

use crate::{AccountId, TokenRef, Units, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors surfaced by a ledger implementation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: need {needed}, have {held}")]
    InsufficientBalance { needed: Units, held: Units },

    #[error("{operator} is not an approved operator for {owner}")]
    NotOperator { owner: AccountId, operator: AccountId },
}

/// External SFT ledger capabilities.
///
/// Preconditions common to all methods:
/// - `token` refers to a token the ledger knows; unknown tokens read as zero
///   balance and transfer like any other (they simply have no holders).
///
/// Postconditions:
/// - `transfer` either moves exactly `units` from `from` to `to` or returns
///   an error with no balance change.
pub trait LedgerGateway {
    fn balance_of(&self, owner: AccountId, token: TokenRef) -> Units;

    /// Move `units` of `token` from `from` to `to`.
    ///
    /// Fails if `from` lacks balance, or if `operator != from` and `operator`
    /// has not been granted operator rights by `from`.
    fn transfer(
        &mut self,
        operator: AccountId,
        from: AccountId,
        to: AccountId,
        token: TokenRef,
        units: Units,
    ) -> std::result::Result<(), LedgerError>;

    /// Capability probe: does this ledger expose royalty information?
    fn supports_royalty(&self) -> bool;

    /// EIP-2981 semantics: deterministic, and the returned amount is
    /// `<= gross`. `None` when the token carries no royalty configuration.
    fn royalty_info(&self, token: TokenRef, gross: Value) -> Option<(AccountId, Value)>;

    fn is_operator(&self, owner: AccountId, operator: AccountId) -> bool;
}

/// Reference in-memory ledger used by tests, the CLI demo, and simulations.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<(TokenRef, AccountId), Units>,
    /// `(owner, operator)` pairs with operator rights granted.
    operators: BTreeSet<(AccountId, AccountId)>,
    /// Per-token royalty configuration: receiver and rate in bps.
    royalties: BTreeMap<TokenRef, (AccountId, u16)>,
    royalty_enabled: bool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            royalty_enabled: true,
            ..Self::default()
        }
    }

    /// Ledger without the royalty capability, for probing the skip path.
    pub fn without_royalty_support() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, owner: AccountId, token: TokenRef, units: Units) {
        *self.balances.entry((token, owner)).or_insert(0) += units;
    }

    pub fn approve_operator(&mut self, owner: AccountId, operator: AccountId) {
        self.operators.insert((owner, operator));
    }

    pub fn set_royalty(&mut self, token: TokenRef, receiver: AccountId, bps: u16) {
        self.royalties.insert(token, (receiver, bps));
    }
}

impl LedgerGateway for InMemoryLedger {
    fn balance_of(&self, owner: AccountId, token: TokenRef) -> Units {
        self.balances.get(&(token, owner)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        operator: AccountId,
        from: AccountId,
        to: AccountId,
        token: TokenRef,
        units: Units,
    ) -> std::result::Result<(), LedgerError> {
        if operator != from && !self.is_operator(from, operator) {
            return Err(LedgerError::NotOperator {
                owner: from,
                operator,
            });
        }
        let held = self.balance_of(from, token);
        if held < units {
            return Err(LedgerError::InsufficientBalance {
                needed: units,
                held,
            });
        }
        if units == 0 {
            return Ok(());
        }
        *self.balances.get_mut(&(token, from)).expect("held checked") -= units;
        *self.balances.entry((token, to)).or_insert(0) += units;
        Ok(())
    }

    fn supports_royalty(&self) -> bool {
        self.royalty_enabled
    }

    fn royalty_info(&self, token: TokenRef, gross: Value) -> Option<(AccountId, Value)> {
        if !self.royalty_enabled {
            return None;
        }
        let (receiver, bps) = *self.royalties.get(&token)?;
        let amount = gross
            .checked_mul(bps as Value)
            .map(|n| n / crate::BPS_DENOM)
            .unwrap_or(0);
        Some((receiver, amount))
    }

    fn is_operator(&self, owner: AccountId, operator: AccountId) -> bool {
        self.operators.contains(&(owner, operator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContractId;

    fn token() -> TokenRef {
        TokenRef::new(ContractId(1), 9)
    }

    #[test]
    fn transfer_requires_balance() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(AccountId(1), token(), 5);
        let err = ledger
            .transfer(AccountId(1), AccountId(1), AccountId(2), token(), 6)
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance { needed: 6, held: 5 });
        assert!(ledger
            .transfer(AccountId(1), AccountId(1), AccountId(2), token(), 5)
            .is_ok());
        assert_eq!(ledger.balance_of(AccountId(2), token()), 5);
    }

    #[test]
    fn third_party_transfer_requires_operator_rights() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(AccountId(1), token(), 5);
        let err = ledger
            .transfer(AccountId(3), AccountId(1), AccountId(2), token(), 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotOperator { .. }));
        ledger.approve_operator(AccountId(1), AccountId(3));
        assert!(ledger
            .transfer(AccountId(3), AccountId(1), AccountId(2), token(), 1)
            .is_ok());
    }

    #[test]
    fn royalty_info_floors() {
        let mut ledger = InMemoryLedger::new();
        ledger.set_royalty(token(), AccountId(9), 1_000);
        let (receiver, amount) = ledger.royalty_info(token(), 15).unwrap();
        assert_eq!(receiver, AccountId(9));
        assert_eq!(amount, 1); // floor(15 * 1000 / 10000)
        assert!(ledger.royalty_info(TokenRef::new(ContractId(2), 1), 100).is_none());
    }

    #[test]
    fn royalty_probe_can_be_disabled() {
        let mut ledger = InMemoryLedger::without_royalty_support();
        ledger.set_royalty(token(), AccountId(9), 1_000);
        assert!(!ledger.supports_royalty());
        assert!(ledger.royalty_info(token(), 100).is_none());
    }
}
