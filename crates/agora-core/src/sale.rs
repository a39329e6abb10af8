//! Fixed-price sale.
//!
//! Listed units sit in engine custody and can be bought in partial fills at
//! an exact per-unit price until the seller unlists the remainder.

use crate::clock::Clock;
use crate::engine::Market;
use crate::ledger::LedgerGateway;
use crate::payments::PaymentRail;
use crate::rng::WinnerSource;
use crate::settlement;
use crate::{
    AccountId, ItemId, ItemSale, MarketError, PositionId, PositionState, Result, Units, Value,
};
use crate::events::MarketEvent;
use crate::positions::DecreaseOutcome;
use tracing::{info, instrument};

impl<L, P, C, W> Market<L, P, C, W>
where
    L: LedgerGateway,
    P: PaymentRail,
    C: Clock,
    W: WinnerSource,
{
    /// List `units` of an item at `price_per_unit`.
    ///
    /// Ingests the units into custody and opens a `RegularSale` position
    /// carrying the current fee snapshot.
    #[instrument(skip(self))]
    pub fn put_on_sale(
        &mut self,
        caller: AccountId,
        item_id: ItemId,
        units: Units,
        price_per_unit: Value,
    ) -> Result<PositionId> {
        self.guarded(|market| {
            if units == 0 {
                return Err(MarketError::BadParameter("units must be > 0".into()));
            }
            if price_per_unit == 0 {
                return Err(MarketError::BadParameter("price must be > 0".into()));
            }
            let token = market.items.get(item_id)?.token;
            let held = market.ledger.balance_of(caller, token);
            if held < units {
                return Err(MarketError::InsufficientBalance {
                    needed: units,
                    held,
                });
            }
            market.ingest_custody(caller, token, units)?;
            let position_id = market.open_position(
                item_id,
                caller,
                units,
                price_per_unit,
                PositionState::RegularSale,
            )?;
            market.sync_available_for(item_id, caller)?;
            info!(
                position = position_id.0,
                item = item_id.0,
                units,
                price = %price_per_unit,
                "listed for sale"
            );
            Ok(position_id)
        })
    }

    /// Buy `units` from a sale position. `value` must equal
    /// `price_per_unit * units` exactly.
    #[instrument(skip(self))]
    pub fn create_sale(
        &mut self,
        buyer: AccountId,
        position_id: PositionId,
        units: Units,
        value: Value,
    ) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::RegularSale)?
                .clone();
            if units == 0 {
                return Err(MarketError::BadParameter("units must be > 0".into()));
            }
            if units > position.amount {
                return Err(MarketError::InsufficientBalance {
                    needed: units,
                    held: position.amount,
                });
            }
            let required = position
                .price
                .checked_mul(units as Value)
                .ok_or(MarketError::Overflow("sale value"))?;
            if value != required {
                return Err(MarketError::BadValue {
                    required,
                    got: value,
                });
            }

            let token = market.items.get(position.item_id)?.token;
            let plan = settlement::plan(
                value,
                position.fee_snapshot,
                position.owner,
                market.royalty_quote(token, value),
                market.royalty_cap(),
            )?;

            // State first: sale history and inventory, then the payouts.
            market.items.append_sale(
                position.item_id,
                ItemSale {
                    seller: position.owner,
                    buyer,
                    price: value,
                    amount: units,
                },
            )?;
            match market.positions.decrease(position_id, units)? {
                DecreaseOutcome::Remaining(amount) => {
                    market.emit(MarketEvent::PositionUpdate {
                        position_id,
                        item_id: position.item_id,
                        owner: position.owner,
                        amount,
                        price: position.price,
                        fee_snapshot: position.fee_snapshot,
                        state: position.state,
                    });
                }
                DecreaseOutcome::Deleted(_) => {
                    market.refresh_position_count(position.item_id)?;
                    market.emit(MarketEvent::PositionDelete { position_id });
                }
            }

            market.execute_settlement(&plan, position.owner, buyer, token, units)?;
            market.sync_available_for(position.item_id, buyer)?;

            info!(
                position = position_id.0,
                buyer = buyer.0,
                units,
                gross = %value,
                "sale settled"
            );
            market.emit(MarketEvent::MarketItemSold {
                item_id: position.item_id,
                token,
                seller: position.owner,
                buyer,
                price: value,
                amount: units,
            });
            Ok(())
        })
    }

    /// Return all listed units to the seller and delete the position.
    #[instrument(skip(self))]
    pub fn unlist(&mut self, caller: AccountId, position_id: PositionId) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::RegularSale)?
                .clone();
            if position.owner != caller {
                return Err(MarketError::Unauthorized("position owner"));
            }
            let token = market.items.get(position.item_id)?.token;

            market.delete_position(position_id)?;
            market.release_custody(caller, token, position.amount)?;
            market.sync_available_for(position.item_id, caller)?;
            info!(position = position_id.0, units = position.amount, "unlisted");
            Ok(())
        })
    }
}
