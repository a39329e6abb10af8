//! Read-only views over the engine state.
//!
//! All enumeration is in ascending id order; large result sets are expected
//! to be paginated by the caller.

use crate::clock::Clock;
use crate::engine::Market;
use crate::ledger::LedgerGateway;
use crate::payments::PaymentRail;
use crate::rng::WinnerSource;
use crate::{AccountId, Item, ItemId, Position, PositionId, PositionState, Result};
use serde::{Deserialize, Serialize};

/// An item with its currently open positions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub item: Item,
    pub positions: Vec<Position>,
}

impl<L, P, C, W> Market<L, P, C, W>
where
    L: LedgerGateway,
    P: PaymentRail,
    C: Clock,
    W: WinnerSource,
{
    pub fn fetch_item(&self, item_id: ItemId) -> Result<ItemView> {
        let item = self.items.get(item_id)?.clone();
        let positions = self
            .positions
            .for_item(item_id)
            .into_iter()
            .cloned()
            .collect();
        Ok(ItemView { item, positions })
    }

    pub fn fetch_position(&self, position_id: PositionId) -> Result<Position> {
        self.positions.get(position_id).cloned()
    }

    pub fn fetch_by_state(&self, state: PositionState) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|p| p.state == state)
            .cloned()
            .collect()
    }

    pub fn fetch_by_owner(&self, owner: AccountId) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect()
    }

    pub fn fetch_items_by_creator(&self, creator: AccountId) -> Vec<Item> {
        self.items
            .iter()
            .filter(|i| i.creator == creator)
            .cloned()
            .collect()
    }

    pub fn fetch_auction(&self, position_id: PositionId) -> Option<crate::auction::AuctionData> {
        self.auctions.get(&position_id).cloned()
    }

    pub fn fetch_raffle(&self, position_id: PositionId) -> Option<crate::raffle::RaffleData> {
        self.raffles.get(&position_id).cloned()
    }

    pub fn fetch_loan(&self, position_id: PositionId) -> Option<crate::loan::LoanData> {
        self.loans.get(&position_id).cloned()
    }
}
