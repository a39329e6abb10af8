//! Position store.
//!
//! Owns the `(state, owner, amount)` tuple for every position, the per-item
//! index, and the uniqueness of Available positions per `(item, owner)`.
//! Sidecar trade data lives with the engine; the store guarantees that a
//! deleted position id is gone from every index.

use crate::{
    AccountId, Bps, ItemId, MarketError, Position, PositionId, PositionState, Result, Units, Value,
};
use std::collections::{BTreeMap, BTreeSet};

/// Result of decreasing a position's amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecreaseOutcome {
    /// Position still open with this amount left.
    Remaining(Units),
    /// Amount reached zero; the position was removed.
    Deleted(Position),
}

#[derive(Clone, Debug, Default)]
pub struct PositionStore {
    positions: BTreeMap<PositionId, Position>,
    by_item: BTreeMap<ItemId, BTreeSet<PositionId>>,
    /// Unique Available position per `(item, owner)`.
    available: BTreeMap<(ItemId, AccountId), PositionId>,
    next_position: u64,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a trade-mode position.
    ///
    /// Preconditions:
    /// - `state != Available` (Available positions are managed through
    ///   [`PositionStore::sync_available`]).
    ///
    /// Postconditions:
    /// - Fails `CapacityExceeded` once the item has `cap` open positions.
    pub fn create(
        &mut self,
        item_id: ItemId,
        owner: AccountId,
        amount: Units,
        price: Value,
        fee_snapshot: Bps,
        state: PositionState,
        cap: usize,
    ) -> Result<PositionId> {
        debug_assert!(state != PositionState::Available);
        if self.count_for_item(item_id) >= cap {
            return Err(MarketError::CapacityExceeded {
                item: item_id,
                limit: cap,
            });
        }
        let position_id = self.next_id();
        self.insert(Position {
            position_id,
            item_id,
            owner,
            amount,
            price,
            fee_snapshot,
            state,
        });
        Ok(position_id)
    }

    pub fn get(&self, position_id: PositionId) -> Result<&Position> {
        self.positions
            .get(&position_id)
            .ok_or(MarketError::PositionNotFound(position_id))
    }

    /// Subtract `units` from a position; removes it at zero.
    pub fn decrease(&mut self, position_id: PositionId, units: Units) -> Result<DecreaseOutcome> {
        let remaining = {
            let position = self
                .positions
                .get_mut(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?;
            if position.amount < units {
                return Err(MarketError::InsufficientBalance {
                    needed: units,
                    held: position.amount,
                });
            }
            position.amount -= units;
            position.amount
        };
        if remaining == 0 {
            Ok(DecreaseOutcome::Deleted(self.remove(position_id)?))
        } else {
            Ok(DecreaseOutcome::Remaining(remaining))
        }
    }

    /// Delete a position and drop it from every index.
    pub fn remove(&mut self, position_id: PositionId) -> Result<Position> {
        let position = self
            .positions
            .remove(&position_id)
            .ok_or(MarketError::PositionNotFound(position_id))?;
        if let Some(set) = self.by_item.get_mut(&position.item_id) {
            set.remove(&position_id);
            if set.is_empty() {
                self.by_item.remove(&position.item_id);
            }
        }
        if position.state == PositionState::Available {
            self.available.remove(&(position.item_id, position.owner));
        }
        Ok(position)
    }

    /// Re-synchronize the owner's Available position with the ledger.
    ///
    /// The ledger is authoritative for units held by non-engine addresses:
    /// after each settlement or return, the caller re-reads the owner's
    /// ledger balance and passes it here. An existing Available position is
    /// set to that balance; otherwise one is created with it; a zero balance
    /// removes any stale Available position.
    pub fn sync_available(
        &mut self,
        item_id: ItemId,
        owner: AccountId,
        ledger_balance: Units,
        fee_snapshot: Bps,
    ) -> Result<Option<PositionId>> {
        match self.available.get(&(item_id, owner)).copied() {
            Some(position_id) => {
                if ledger_balance == 0 {
                    self.remove(position_id)?;
                    return Ok(None);
                }
                let position = self
                    .positions
                    .get_mut(&position_id)
                    .ok_or(MarketError::PositionNotFound(position_id))?;
                position.amount = ledger_balance;
                Ok(Some(position_id))
            }
            None => {
                if ledger_balance == 0 {
                    return Ok(None);
                }
                let position_id = self.next_id();
                self.insert(Position {
                    position_id,
                    item_id,
                    owner,
                    amount: ledger_balance,
                    price: 0,
                    fee_snapshot,
                    state: PositionState::Available,
                });
                Ok(Some(position_id))
            }
        }
    }

    pub fn available_id(&self, item_id: ItemId, owner: AccountId) -> Option<PositionId> {
        self.available.get(&(item_id, owner)).copied()
    }

    pub fn count_for_item(&self, item_id: ItemId) -> usize {
        self.by_item.get(&item_id).map_or(0, |s| s.len())
    }

    /// All positions in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn for_item(&self, item_id: ItemId) -> Vec<&Position> {
        self.by_item
            .get(&item_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.positions.get(id))
            .collect()
    }

    fn next_id(&mut self) -> PositionId {
        self.next_position += 1;
        PositionId(self.next_position)
    }

    fn insert(&mut self, position: Position) {
        let id = position.position_id;
        self.by_item
            .entry(position.item_id)
            .or_default()
            .insert(id);
        if position.state == PositionState::Available {
            self.available
                .insert((position.item_id, position.owner), id);
        }
        self.positions.insert(id, position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: usize = 16;

    fn store_with_one() -> (PositionStore, PositionId) {
        let mut store = PositionStore::new();
        let id = store
            .create(
                ItemId(1),
                AccountId(1),
                10,
                5,
                Bps::new(250).unwrap(),
                PositionState::RegularSale,
                CAP,
            )
            .unwrap();
        (store, id)
    }

    #[test]
    fn partial_decrease_keeps_position() {
        let (mut store, id) = store_with_one();
        assert_eq!(
            store.decrease(id, 3).unwrap(),
            DecreaseOutcome::Remaining(7)
        );
        assert_eq!(store.get(id).unwrap().amount, 7);
    }

    #[test]
    fn full_decrease_deletes_and_unindexes() {
        let (mut store, id) = store_with_one();
        let out = store.decrease(id, 10).unwrap();
        assert!(matches!(out, DecreaseOutcome::Deleted(p) if p.position_id == id));
        assert!(store.get(id).is_err());
        assert_eq!(store.count_for_item(ItemId(1)), 0);
    }

    #[test]
    fn decrease_past_amount_is_rejected() {
        let (mut store, id) = store_with_one();
        assert!(matches!(
            store.decrease(id, 11),
            Err(MarketError::InsufficientBalance { needed: 11, held: 10 })
        ));
    }

    #[test]
    fn capacity_is_fail_closed() {
        let mut store = PositionStore::new();
        for _ in 0..2 {
            store
                .create(
                    ItemId(1),
                    AccountId(1),
                    1,
                    1,
                    Bps::ZERO,
                    PositionState::RegularSale,
                    2,
                )
                .unwrap();
        }
        let err = store
            .create(
                ItemId(1),
                AccountId(1),
                1,
                1,
                Bps::ZERO,
                PositionState::RegularSale,
                2,
            )
            .unwrap_err();
        assert!(matches!(err, MarketError::CapacityExceeded { limit: 2, .. }));
    }

    #[test]
    fn available_positions_merge_not_duplicate() {
        let mut store = PositionStore::new();
        let first = store
            .sync_available(ItemId(1), AccountId(2), 3, Bps::ZERO)
            .unwrap()
            .unwrap();
        let second = store
            .sync_available(ItemId(1), AccountId(2), 8, Bps::ZERO)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get(first).unwrap().amount, 8);
        assert_eq!(
            store
                .iter()
                .filter(|p| p.state == PositionState::Available)
                .count(),
            1
        );
    }

    #[test]
    fn zero_balance_clears_available() {
        let mut store = PositionStore::new();
        store
            .sync_available(ItemId(1), AccountId(2), 3, Bps::ZERO)
            .unwrap();
        assert!(store
            .sync_available(ItemId(1), AccountId(2), 0, Bps::ZERO)
            .unwrap()
            .is_none());
        assert!(store.available_id(ItemId(1), AccountId(2)).is_none());
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn iteration_is_ascending_by_id() {
        let mut store = PositionStore::new();
        for _ in 0..4 {
            store
                .create(
                    ItemId(1),
                    AccountId(1),
                    1,
                    1,
                    Bps::ZERO,
                    PositionState::Auction,
                    CAP,
                )
                .unwrap();
        }
        let ids: Vec<u64> = store.iter().map(|p| p.position_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
