//! English auction.
//!
//! Highest bid wins at the deadline. A bid landing inside the soft-close
//! window pushes the deadline out so at least ten minutes always remain,
//! which defeats last-second sniping. Outbid bidders are refunded
//! immediately; a refund the rail cannot deliver becomes a claimable
//! balance and never blocks the new bid.

use crate::clock::Clock;
use crate::engine::Market;
use crate::events::MarketEvent;
use crate::ledger::LedgerGateway;
use crate::payments::PaymentRail;
use crate::rng::WinnerSource;
use crate::settlement;
use crate::{
    AccountId, ItemId, ItemSale, MarketError, PositionId, PositionState, Result, Timestamp, Units,
    Value,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Duration bounds: one hour to 31 days, in minutes.
pub const MIN_AUCTION_MINUTES: u64 = 60;
pub const MAX_AUCTION_MINUTES: u64 = 44_640;

/// Late bids keep at least this many seconds on the clock.
pub const SOFT_CLOSE_WINDOW_SECS: u64 = 600;

/// Sidecar state of one running auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionData {
    pub deadline: Timestamp,
    pub min_bid: Value,
    pub highest_bidder: Option<AccountId>,
    pub highest_bid: Value,
}

impl<L, P, C, W> Market<L, P, C, W>
where
    L: LedgerGateway,
    P: PaymentRail,
    C: Clock,
    W: WinnerSource,
{
    /// Open an auction over `units` of an item.
    #[instrument(skip(self))]
    pub fn create_auction(
        &mut self,
        caller: AccountId,
        item_id: ItemId,
        units: Units,
        duration_minutes: u64,
        min_bid: Value,
    ) -> Result<PositionId> {
        self.guarded(|market| {
            if units == 0 {
                return Err(MarketError::BadParameter("units must be > 0".into()));
            }
            if !(MIN_AUCTION_MINUTES..=MAX_AUCTION_MINUTES).contains(&duration_minutes) {
                return Err(MarketError::BadParameter(format!(
                    "auction duration {duration_minutes}min outside \
                     [{MIN_AUCTION_MINUTES}, {MAX_AUCTION_MINUTES}]"
                )));
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
            let position_id =
                market.open_position(item_id, caller, units, min_bid, PositionState::Auction)?;
            let deadline = market.clock.now() + duration_minutes * 60;
            market.auctions.insert(
                position_id,
                AuctionData {
                    deadline,
                    min_bid,
                    highest_bidder: None,
                    highest_bid: 0,
                },
            );
            market.sync_available_for(item_id, caller)?;
            info!(
                position = position_id.0,
                item = item_id.0,
                units,
                deadline,
                "auction opened"
            );
            Ok(position_id)
        })
    }

    /// Place or top up a bid of `value`.
    ///
    /// The current highest bidder may top up incrementally with no minimum
    /// gap; a new bidder must reach `max(min_bid, highest_bid + 1)`. The
    /// displaced bidder is refunded their full previous bid.
    #[instrument(skip(self))]
    pub fn create_bid(
        &mut self,
        bidder: AccountId,
        position_id: PositionId,
        value: Value,
    ) -> Result<()> {
        self.guarded(|market| {
            market.position_in_state(position_id, PositionState::Auction)?;
            let now = market.clock.now();
            let data = market
                .auctions
                .get(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?
                .clone();
            if now > data.deadline {
                return Err(MarketError::DeadlineExceeded {
                    deadline: data.deadline,
                    now,
                });
            }
            if value == 0 {
                return Err(MarketError::BadValue {
                    required: 1,
                    got: 0,
                });
            }

            let mut refund: Option<(AccountId, Value)> = None;
            let (bidder_after, bid_after) = if data.highest_bidder == Some(bidder) {
                let topped = settlement::add_value(data.highest_bid, value)?;
                (bidder, topped)
            } else {
                let floor = data.min_bid.max(settlement::add_value(data.highest_bid, 1)?);
                if value < floor {
                    return Err(MarketError::BadValue {
                        required: floor,
                        got: value,
                    });
                }
                if let Some(prev) = data.highest_bidder {
                    refund = Some((prev, data.highest_bid));
                }
                (bidder, value)
            };

            // Soft close: keep at least the window on the clock.
            let remaining = data.deadline - now;
            let deadline = if remaining < SOFT_CLOSE_WINDOW_SECS {
                now + SOFT_CLOSE_WINDOW_SECS
            } else {
                data.deadline
            };

            // Bid state is final before the refund leaves the engine.
            let entry = market
                .auctions
                .get_mut(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?;
            entry.highest_bidder = Some(bidder_after);
            entry.highest_bid = bid_after;
            entry.deadline = deadline;

            if let Some((prev, amount)) = refund {
                market.pay_or_credit(prev, amount, "bid refund")?;
            }
            debug!(
                position = position_id.0,
                bidder = bidder.0,
                bid = %bid_after,
                deadline,
                "bid accepted"
            );
            Ok(())
        })
    }

    /// Close an auction past its deadline.
    ///
    /// With a standing bid the units settle to the winner; otherwise they
    /// return to the seller. Either way the position and its auction data
    /// are deleted, so a second call fails `PositionNotFound`.
    #[instrument(skip(self))]
    pub fn end_auction(&mut self, position_id: PositionId) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::Auction)?
                .clone();
            let data = market
                .auctions
                .get(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?
                .clone();
            let now = market.clock.now();
            if now <= data.deadline {
                return Err(MarketError::DeadlineNotReached {
                    deadline: data.deadline,
                    now,
                });
            }
            let token = market.items.get(position.item_id)?.token;

            if let Some(winner) = data.highest_bidder {
                let gross = data.highest_bid;
                let plan = settlement::plan(
                    gross,
                    position.fee_snapshot,
                    position.owner,
                    market.royalty_quote(token, gross),
                    market.royalty_cap(),
                )?;
                market.items.append_sale(
                    position.item_id,
                    ItemSale {
                        seller: position.owner,
                        buyer: winner,
                        price: gross,
                        amount: position.amount,
                    },
                )?;
                market.delete_position(position_id)?;
                market.execute_settlement(&plan, position.owner, winner, token, position.amount)?;
                market.sync_available_for(position.item_id, winner)?;
                market.emit(MarketEvent::MarketItemSold {
                    item_id: position.item_id,
                    token,
                    seller: position.owner,
                    buyer: winner,
                    price: gross,
                    amount: position.amount,
                });
                info!(
                    position = position_id.0,
                    winner = winner.0,
                    gross = %gross,
                    "auction settled"
                );
            } else {
                market.delete_position(position_id)?;
                market.release_custody(position.owner, token, position.amount)?;
                market.sync_available_for(position.item_id, position.owner)?;
                info!(position = position_id.0, "auction closed without bids");
            }
            market.metrics.auctions_closed.inc();
            Ok(())
        })
    }
}
