//! Raffle.
//!
//! Entries buy whole-unit tickets; at the deadline one ticket is drawn from
//! the injected winner source and the full pot settles as the gross sale
//! value. Sub-ticket remainders are accepted into the pot's payment but are
//! not ticket-counted.

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

/// One whole unit of the native currency buys one ticket.
pub const TICKET_UNIT: Value = 1_000_000_000_000_000_000;

/// Duration bounds match the auction's: one hour to 31 days.
pub const MIN_RAFFLE_MINUTES: u64 = crate::auction::MIN_AUCTION_MINUTES;
pub const MAX_RAFFLE_MINUTES: u64 = crate::auction::MAX_AUCTION_MINUTES;

/// A participant's accumulated tickets, in insertion order of first entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleEntry {
    pub account: AccountId,
    pub tickets: u128,
}

/// Sidecar state of one running raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleData {
    pub deadline: Timestamp,
    pub total_tickets: u128,
    pub entries: Vec<RaffleEntry>,
}

impl<L, P, C, W> Market<L, P, C, W>
where
    L: LedgerGateway,
    P: PaymentRail,
    C: Clock,
    W: WinnerSource,
{
    #[instrument(skip(self))]
    pub fn create_raffle(
        &mut self,
        caller: AccountId,
        item_id: ItemId,
        units: Units,
        duration_minutes: u64,
    ) -> Result<PositionId> {
        self.guarded(|market| {
            if units == 0 {
                return Err(MarketError::BadParameter("units must be > 0".into()));
            }
            if !(MIN_RAFFLE_MINUTES..=MAX_RAFFLE_MINUTES).contains(&duration_minutes) {
                return Err(MarketError::BadParameter(format!(
                    "raffle duration {duration_minutes}min outside \
                     [{MIN_RAFFLE_MINUTES}, {MAX_RAFFLE_MINUTES}]"
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
                market.open_position(item_id, caller, units, 0, PositionState::Raffle)?;
            let deadline = market.clock.now() + duration_minutes * 60;
            market.raffles.insert(
                position_id,
                RaffleData {
                    deadline,
                    total_tickets: 0,
                    entries: Vec::new(),
                },
            );
            market.sync_available_for(item_id, caller)?;
            info!(
                position = position_id.0,
                item = item_id.0,
                units,
                deadline,
                "raffle opened"
            );
            Ok(position_id)
        })
    }

    /// Enter with `value >= TICKET_UNIT`; tickets are `value / TICKET_UNIT`
    /// floored. Repeat entries accumulate on the account's first entry.
    #[instrument(skip(self))]
    pub fn enter_raffle(
        &mut self,
        entrant: AccountId,
        position_id: PositionId,
        value: Value,
    ) -> Result<()> {
        self.guarded(|market| {
            market.position_in_state(position_id, PositionState::Raffle)?;
            let now = market.clock.now();
            let data = market
                .raffles
                .get_mut(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?;
            if now > data.deadline {
                return Err(MarketError::DeadlineExceeded {
                    deadline: data.deadline,
                    now,
                });
            }
            if value < TICKET_UNIT {
                return Err(MarketError::BadValue {
                    required: TICKET_UNIT,
                    got: value,
                });
            }
            let tickets = value / TICKET_UNIT;
            match data.entries.iter_mut().find(|e| e.account == entrant) {
                Some(entry) => {
                    entry.tickets = entry
                        .tickets
                        .checked_add(tickets)
                        .ok_or(MarketError::Overflow("raffle entry"))?;
                }
                None => data.entries.push(RaffleEntry {
                    account: entrant,
                    tickets,
                }),
            }
            data.total_tickets = data
                .total_tickets
                .checked_add(tickets)
                .ok_or(MarketError::Overflow("raffle total"))?;
            debug!(
                position = position_id.0,
                entrant = entrant.0,
                tickets = %tickets,
                "raffle entry"
            );
            Ok(())
        })
    }

    /// Close a raffle past its deadline.
    ///
    /// Without entries the units return to the seller. Otherwise a ticket
    /// index is drawn and the first entry whose running ticket total exceeds
    /// it wins; the pot settles as gross `total_tickets * TICKET_UNIT`.
    #[instrument(skip(self))]
    pub fn end_raffle(&mut self, position_id: PositionId) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::Raffle)?
                .clone();
            let data = market
                .raffles
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

            if data.total_tickets == 0 {
                market.delete_position(position_id)?;
                market.release_custody(position.owner, token, position.amount)?;
                market.sync_available_for(position.item_id, position.owner)?;
                market.metrics.raffles_closed.inc();
                info!(position = position_id.0, "raffle closed without entries");
                return Ok(());
            }

            let drawn = market.winners.draw(data.total_tickets);
            let winner = winning_entry(&data.entries, drawn)
                .ok_or(MarketError::InvariantViolation("raffle draw past entries"))?;
            let gross = data
                .total_tickets
                .checked_mul(TICKET_UNIT)
                .ok_or(MarketError::Overflow("raffle gross"))?;
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
            market.metrics.raffles_closed.inc();
            info!(
                position = position_id.0,
                winner = winner.0,
                tickets = %data.total_tickets,
                "raffle settled"
            );
            Ok(())
        })
    }
}

/// Walk entries in insertion order; the first whose running total exceeds
/// `drawn` wins.
fn winning_entry(entries: &[RaffleEntry], drawn: u128) -> Option<AccountId> {
    let mut running = 0u128;
    for entry in entries {
        running = running.checked_add(entry.tickets)?;
        if running > drawn {
            return Some(entry.account);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<RaffleEntry> {
        vec![
            RaffleEntry {
                account: AccountId(1),
                tickets: 3,
            },
            RaffleEntry {
                account: AccountId(2),
                tickets: 1,
            },
            RaffleEntry {
                account: AccountId(3),
                tickets: 6,
            },
        ]
    }

    #[test]
    fn draw_respects_cumulative_ranges() {
        let e = entries();
        for drawn in 0..3 {
            assert_eq!(winning_entry(&e, drawn), Some(AccountId(1)));
        }
        assert_eq!(winning_entry(&e, 3), Some(AccountId(2)));
        for drawn in 4..10 {
            assert_eq!(winning_entry(&e, drawn), Some(AccountId(3)));
        }
    }

    #[test]
    fn draw_past_total_has_no_winner() {
        assert_eq!(winning_entry(&entries(), 10), None);
        assert_eq!(winning_entry(&[], 0), None);
    }
}
