//! Outbound native-currency transfers.
//!
//! Every payout the engine makes (royalty, platform fee, seller proceeds,
//! bid refunds, loan principal and payoff) goes through this seam. A rail
//! failure is non-fatal to the triggering trade: the engine credits the
//! amount to the recipient's claimable balance instead.

use crate::{AccountId, Value};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("recipient {0} rejected the transfer")]
    Rejected(AccountId),
}

/// Native-currency transfer capability.
///
/// Postconditions:
/// - On `Ok`, exactly `amount` was delivered to `to`.
/// - On `Err`, nothing was delivered; the caller decides how to account for
///   the undelivered amount.
pub trait PaymentRail {
    fn pay(&mut self, to: AccountId, amount: Value) -> std::result::Result<(), PaymentError>;
}

/// Recording rail for tests and the CLI demo.
///
/// Tracks every successful payment and can be told to reject specific
/// recipients, simulating hostile or broken payout targets.
#[derive(Clone, Debug, Default)]
pub struct RecordingRail {
    payments: Vec<(AccountId, Value)>,
    rejecting: BTreeSet<AccountId>,
}

impl RecordingRail {
    pub fn new() -> Self {
        Self::default()
    }

    /// All successful payments, in order.
    pub fn payments(&self) -> &[(AccountId, Value)] {
        &self.payments
    }

    /// Total successfully delivered to `to`.
    pub fn total_paid(&self, to: AccountId) -> Value {
        self.payments
            .iter()
            .filter(|(a, _)| *a == to)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn reject_payments_to(&mut self, to: AccountId) {
        self.rejecting.insert(to);
    }

    pub fn accept_payments_to(&mut self, to: AccountId) {
        self.rejecting.remove(&to);
    }
}

impl PaymentRail for RecordingRail {
    fn pay(&mut self, to: AccountId, amount: Value) -> std::result::Result<(), PaymentError> {
        if self.rejecting.contains(&to) {
            return Err(PaymentError::Rejected(to));
        }
        self.payments.push((to, amount));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_successful_payments() {
        let mut rail = RecordingRail::new();
        rail.pay(AccountId(1), 10).unwrap();
        rail.pay(AccountId(1), 5).unwrap();
        rail.pay(AccountId(2), 3).unwrap();
        assert_eq!(rail.total_paid(AccountId(1)), 15);
        assert_eq!(rail.payments().len(), 3);
    }

    #[test]
    fn rejection_is_per_recipient_and_reversible() {
        let mut rail = RecordingRail::new();
        rail.reject_payments_to(AccountId(1));
        assert_eq!(
            rail.pay(AccountId(1), 10),
            Err(PaymentError::Rejected(AccountId(1)))
        );
        rail.pay(AccountId(2), 10).unwrap();
        rail.accept_payments_to(AccountId(1));
        rail.pay(AccountId(1), 10).unwrap();
        assert_eq!(rail.total_paid(AccountId(1)), 10);
    }
}
