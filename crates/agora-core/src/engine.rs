//! The marketplace engine.
//!
//! `Market` composes the item registry, position store, sidecar tables,
//! claim ledger and the injected capabilities (SFT ledger, payment rail,
//! clock, winner source). Public operations execute to completion as one
//! serialized transaction; a per-operation entry flag additionally rejects
//! callback loops through shared ownership.
//!
//! Mutation discipline on every path that moves units or currency out of the
//! engine: position/sidecar state is updated first, outbound transfers run
//! second, Available positions re-sync against the ledger last.

use crate::auction::AuctionData;
use crate::claims::ClaimLedger;
use crate::clock::Clock;
use crate::config::{MarketConfig, MAX_MARKET_FEE_BPS, ROYALTY_CAP_BPS};
use crate::events::{EventSink, MarketEvent};
use crate::ledger::LedgerGateway;
use crate::loan::LoanData;
use crate::metrics::MarketMetrics;
use crate::payments::PaymentRail;
use crate::positions::PositionStore;
use crate::raffle::RaffleData;
use crate::registry::ItemRegistry;
use crate::rng::WinnerSource;
use crate::settlement::SettlementPlan;
use crate::{
    AccountId, Bps, ItemId, MarketError, Position, PositionId, PositionState, Result, TokenRef,
    Units, Value,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

pub struct Market<L, P, C, W> {
    pub(crate) config: MarketConfig,
    pub(crate) market_fee: Bps,
    pub(crate) ledger: L,
    pub(crate) rail: P,
    pub(crate) clock: C,
    pub(crate) winners: W,
    pub(crate) items: ItemRegistry,
    pub(crate) positions: PositionStore,
    pub(crate) auctions: BTreeMap<PositionId, AuctionData>,
    pub(crate) raffles: BTreeMap<PositionId, RaffleData>,
    pub(crate) loans: BTreeMap<PositionId, LoanData>,
    pub(crate) claims: ClaimLedger,
    pub(crate) metrics: MarketMetrics,
    events: Vec<MarketEvent>,
    sink: Option<Box<dyn EventSink>>,
    entered: bool,
}

impl<L, P, C, W> Market<L, P, C, W>
where
    L: LedgerGateway,
    P: PaymentRail,
    C: Clock,
    W: WinnerSource,
{
    pub fn new(config: MarketConfig, ledger: L, rail: P, clock: C, winners: W) -> Result<Self> {
        config.validate()?;
        let market_fee = config.market_fee;
        Ok(Self {
            config,
            market_fee,
            ledger,
            rail,
            clock,
            winners,
            items: ItemRegistry::new(),
            positions: PositionStore::new(),
            auctions: BTreeMap::new(),
            raffles: BTreeMap::new(),
            loans: BTreeMap::new(),
            claims: ClaimLedger::new(),
            metrics: MarketMetrics::new(),
            events: Vec::new(),
            sink: None,
            entered: false,
        })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn rail(&self) -> &P {
        &self.rail
    }

    pub fn rail_mut(&mut self) -> &mut P {
        &mut self.rail
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn metrics(&self) -> &MarketMetrics {
        &self.metrics
    }

    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = Some(sink);
    }

    /// Events emitted since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }

    // ---------------------------------------------------------------------
    // Registry surface
    // ---------------------------------------------------------------------

    /// Register a `(contract, token_id)` pair as a market item.
    ///
    /// The caller must hold at least one unit; the first registrant becomes
    /// the item's creator. An Available position tracking the caller's
    /// ledger balance is opened alongside.
    #[instrument(skip(self))]
    pub fn create_item(&mut self, caller: AccountId, token: TokenRef) -> Result<ItemId> {
        self.guarded(|market| {
            let held = market.ledger.balance_of(caller, token);
            if held == 0 {
                return Err(MarketError::NoBalance);
            }
            let item_id = market.items.create(token, caller)?;
            market.metrics.items_created.inc();
            info!(item = item_id.0, token = ?token, creator = caller.0, "item created");
            market.emit(MarketEvent::ItemCreated {
                item_id,
                token,
                creator: caller,
            });
            market.sync_available_for(item_id, caller)?;
            Ok(item_id)
        })
    }

    // ---------------------------------------------------------------------
    // Admin surface
    // ---------------------------------------------------------------------

    pub fn market_fee(&self) -> Bps {
        self.market_fee
    }

    /// Change the platform fee rate. Owner only; capped at 1000 bps.
    ///
    /// Open positions are unaffected: they settle at their snapshot.
    #[instrument(skip(self))]
    pub fn set_market_fee(&mut self, caller: AccountId, fee: Bps) -> Result<()> {
        if caller != self.config.platform_owner {
            return Err(MarketError::Unauthorized("platform owner"));
        }
        if fee.get() > MAX_MARKET_FEE_BPS {
            return Err(MarketError::BadParameter(format!(
                "market fee {} bps exceeds cap {MAX_MARKET_FEE_BPS} bps",
                fee.get()
            )));
        }
        let prev = self.market_fee;
        self.market_fee = fee;
        info!(prev = prev.get(), new = fee.get(), "market fee changed");
        self.emit(MarketEvent::MarketFeeChanged { prev, new: fee });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Claimable balances
    // ---------------------------------------------------------------------

    pub fn claimable(&self, account: AccountId) -> Value {
        self.claims.balance_of(account)
    }

    /// Withdraw the caller's full accrued claimable balance.
    ///
    /// On rail failure the balance is retained and the error surfaced; the
    /// caller can retry.
    #[instrument(skip(self))]
    pub fn withdraw(&mut self, caller: AccountId) -> Result<Value> {
        self.guarded(|market| {
            let amount = market.claims.take(caller);
            if amount == 0 {
                return Err(MarketError::NoBalance);
            }
            if let Err(e) = market.rail.pay(caller, amount) {
                market.claims.credit(caller, amount)?;
                return Err(MarketError::PaymentFailed {
                    to: caller,
                    reason: e.to_string(),
                });
            }
            market.metrics.withdrawals.inc();
            market
                .metrics
                .record_claims_outstanding(market.claims.total_outstanding());
            debug!(account = caller.0, amount = %amount, "claim withdrawn");
            Ok(amount)
        })
    }

    // ---------------------------------------------------------------------
    // Shared plumbing for the mode engines
    // ---------------------------------------------------------------------

    /// Serialize an operation and reject re-entry from transfer callbacks.
    pub(crate) fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.entered {
            return Err(MarketError::Reentrancy);
        }
        self.entered = true;
        let out = f(self);
        self.entered = false;
        out
    }

    pub(crate) fn emit(&mut self, event: MarketEvent) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.publish(&event) {
                warn!(error = %e, "event sink publish failed");
            }
        }
        self.events.push(event);
    }

    pub(crate) fn position_in_state(
        &self,
        position_id: PositionId,
        required: PositionState,
    ) -> Result<&Position> {
        let position = self.positions.get(position_id)?;
        if position.state != required {
            return Err(MarketError::WrongState {
                position: position_id,
                required,
                actual: position.state,
            });
        }
        Ok(position)
    }

    /// Pull `units` of `token` from `owner` into engine custody.
    ///
    /// This is the one transfer whose failure aborts the operation: the
    /// engine must hold what it claims to hold. Requires prior operator
    /// approval from `owner` on the ledger.
    pub(crate) fn ingest_custody(
        &mut self,
        owner: AccountId,
        token: TokenRef,
        units: Units,
    ) -> Result<()> {
        let custody = self.config.custody_account;
        if !self.ledger.is_operator(owner, custody) {
            return Err(MarketError::Ledger(crate::ledger::LedgerError::NotOperator {
                owner,
                operator: custody,
            }));
        }
        self.ledger.transfer(custody, owner, custody, token, units)?;
        Ok(())
    }

    /// Move `units` of `token` out of custody to `to`. Under the engine's
    /// invariants this cannot lack balance; an error here is fail-closed.
    pub(crate) fn release_custody(
        &mut self,
        to: AccountId,
        token: TokenRef,
        units: Units,
    ) -> Result<()> {
        let custody = self.config.custody_account;
        self.ledger.transfer(custody, custody, to, token, units)?;
        Ok(())
    }

    /// Pay `amount` to `to`; on rail failure credit it as claimable.
    ///
    /// Returns whether the rail delivered directly.
    pub(crate) fn pay_or_credit(
        &mut self,
        to: AccountId,
        amount: Value,
        context: &'static str,
    ) -> Result<bool> {
        if amount == 0 {
            return Ok(true);
        }
        match self.rail.pay(to, amount) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(to = to.0, amount = %amount, context, error = %e, "payout failed, crediting claim");
                self.claims.credit(to, amount)?;
                self.metrics.claims_accrued.inc();
                self.metrics
                    .record_claims_outstanding(self.claims.total_outstanding());
                Ok(false)
            }
        }
    }

    /// Open a trade-mode position and refresh the item's position count.
    pub(crate) fn open_position(
        &mut self,
        item_id: ItemId,
        owner: AccountId,
        amount: Units,
        price: Value,
        state: PositionState,
    ) -> Result<PositionId> {
        let fee_snapshot = self.market_fee;
        let cap = self.config.max_positions_per_item;
        let position_id = self
            .positions
            .create(item_id, owner, amount, price, fee_snapshot, state, cap)?;
        self.refresh_position_count(item_id)?;
        self.metrics.positions_opened.inc();
        self.emit(MarketEvent::PositionUpdate {
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

    /// Delete a position, its sidecar data, and refresh the item count.
    pub(crate) fn delete_position(&mut self, position_id: PositionId) -> Result<Position> {
        let position = self.positions.remove(position_id)?;
        self.auctions.remove(&position_id);
        self.raffles.remove(&position_id);
        self.loans.remove(&position_id);
        self.refresh_position_count(position.item_id)?;
        self.emit(MarketEvent::PositionDelete { position_id });
        Ok(position)
    }

    /// Re-sync the owner's Available position with their ledger balance.
    pub(crate) fn sync_available_for(&mut self, item_id: ItemId, owner: AccountId) -> Result<()> {
        let token = self.items.get(item_id)?.token;
        let balance = self.ledger.balance_of(owner, token);
        let fee_snapshot = self.market_fee;
        let before = self.positions.available_id(item_id, owner);
        let synced = self
            .positions
            .sync_available(item_id, owner, balance, fee_snapshot)?;
        self.refresh_position_count(item_id)?;
        match synced {
            Some(position_id) => {
                let position = self.positions.get(position_id)?.clone();
                self.emit(MarketEvent::PositionUpdate {
                    position_id,
                    item_id,
                    owner,
                    amount: position.amount,
                    price: position.price,
                    fee_snapshot: position.fee_snapshot,
                    state: position.state,
                });
            }
            None => {
                if let Some(position_id) = before {
                    self.emit(MarketEvent::PositionDelete { position_id });
                }
            }
        }
        Ok(())
    }

    /// Execute a computed settlement: royalty, fee, seller, then units.
    ///
    /// Callers have already removed the settled units from position state;
    /// this function only moves value and custody.
    pub(crate) fn execute_settlement(
        &mut self,
        plan: &SettlementPlan,
        seller: AccountId,
        recipient: AccountId,
        token: TokenRef,
        units: Units,
    ) -> Result<()> {
        if let Some(receiver) = plan.royalty_receiver {
            self.pay_or_credit(receiver, plan.royalty, "royalty")?;
            self.emit(MarketEvent::RoyaltiesPaid {
                token,
                value: plan.royalty,
            });
        }
        let platform = self.config.platform_owner;
        self.pay_or_credit(platform, plan.fee, "platform fee")?;
        self.pay_or_credit(seller, plan.seller_net, "seller proceeds")?;
        self.release_custody(recipient, token, units)?;
        self.metrics.record_settlement(plan.gross);
        debug!(
            gross = %plan.gross,
            royalty = %plan.royalty,
            fee = %plan.fee,
            net = %plan.seller_net,
            "settlement executed"
        );
        Ok(())
    }

    /// Royalty quote for a settlement, `None` when the capability is absent.
    pub(crate) fn royalty_quote(
        &self,
        token: TokenRef,
        gross: Value,
    ) -> Option<(AccountId, Value)> {
        if !self.ledger.supports_royalty() {
            return None;
        }
        self.ledger.royalty_info(token, gross)
    }

    pub(crate) fn royalty_cap(&self) -> Bps {
        Bps::new(ROYALTY_CAP_BPS).expect("cap constant is in range")
    }

    pub(crate) fn refresh_position_count(&mut self, item_id: ItemId) -> Result<()> {
        let count = self.positions.count_for_item(item_id) as u64;
        self.items.get_mut(item_id)?.position_count = count;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Invariant audit
    // ---------------------------------------------------------------------

    /// Validate the engine's global invariants against live state.
    ///
    /// Intended for tests and simulations after each mutation step; all
    /// checks are read-only.
    pub fn check_invariants(&self) -> Result<()> {
        // Custody backing: per item, committed units equal the engine's
        // ledger balance for that token.
        let custody = self.config.custody_account;
        for item in self.items.iter() {
            let committed: u128 = self
                .positions
                .for_item(item.item_id)
                .iter()
                .filter(|p| p.state != PositionState::Available)
                .map(|p| p.amount as u128)
                .sum();
            let held = self.ledger.balance_of(custody, item.token) as u128;
            if committed != held {
                return Err(MarketError::InvariantViolation(
                    "custody balance does not match committed units",
                ));
            }
        }

        // Available uniqueness.
        let mut seen = std::collections::BTreeSet::new();
        for p in self.positions.iter() {
            if p.fee_snapshot.get() > MAX_MARKET_FEE_BPS {
                return Err(MarketError::InvariantViolation(
                    "fee snapshot above cap",
                ));
            }
            if p.state == PositionState::Available && !seen.insert((p.item_id, p.owner)) {
                return Err(MarketError::InvariantViolation(
                    "duplicate available position for (item, owner)",
                ));
            }
        }

        // Sidecar pairing and per-mode invariants.
        for p in self.positions.iter() {
            let paired = match p.state {
                PositionState::Auction => self.auctions.contains_key(&p.position_id),
                PositionState::Raffle => self.raffles.contains_key(&p.position_id),
                PositionState::Loan => self.loans.contains_key(&p.position_id),
                _ => true,
            };
            if !paired {
                return Err(MarketError::InvariantViolation(
                    "trade position missing sidecar data",
                ));
            }
        }
        for (id, a) in &self.auctions {
            if self.position_in_state(*id, PositionState::Auction).is_err() {
                return Err(MarketError::InvariantViolation("orphan auction sidecar"));
            }
            if (a.highest_bid > 0) != a.highest_bidder.is_some() {
                return Err(MarketError::InvariantViolation(
                    "auction bid and bidder out of step",
                ));
            }
        }
        for (id, r) in &self.raffles {
            if self.position_in_state(*id, PositionState::Raffle).is_err() {
                return Err(MarketError::InvariantViolation("orphan raffle sidecar"));
            }
            let sum: u128 = r.entries.iter().map(|e| e.tickets).sum();
            if sum != r.total_tickets {
                return Err(MarketError::InvariantViolation(
                    "raffle total diverges from entries",
                ));
            }
        }
        for (id, l) in &self.loans {
            if self.position_in_state(*id, PositionState::Loan).is_err() {
                return Err(MarketError::InvariantViolation("orphan loan sidecar"));
            }
            if l.lender.is_none() != (l.deadline == 0) {
                return Err(MarketError::InvariantViolation(
                    "loan lender and deadline out of step",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::InMemoryLedger;
    use crate::payments::RecordingRail;
    use crate::rng::SeededWinnerSource;

    fn market() -> Market<InMemoryLedger, RecordingRail, ManualClock, SeededWinnerSource> {
        Market::new(
            MarketConfig::default(),
            InMemoryLedger::new(),
            RecordingRail::new(),
            ManualClock::starting_at(0),
            SeededWinnerSource::from_seed(1),
        )
        .unwrap()
    }

    #[test]
    fn nested_entry_is_rejected() {
        let mut m = market();
        let out = m.guarded(|m| m.guarded(|_| Ok(())));
        assert!(matches!(out, Err(MarketError::Reentrancy)));
        // The flag clears after the failure; fresh operations run.
        assert!(m.guarded(|_| Ok(())).is_ok());
    }

    #[test]
    fn failed_payout_accrues_claim() {
        let mut m = market();
        m.rail_mut().reject_payments_to(AccountId(5));
        let paid = m.pay_or_credit(AccountId(5), 40, "test").unwrap();
        assert!(!paid);
        assert_eq!(m.claimable(AccountId(5)), 40);
        assert_eq!(m.metrics().claims_accrued.get(), 1);
        assert_eq!(m.metrics().claims_outstanding.get(), 40);

        // Draining the claim brings the gauge back down.
        m.rail_mut().accept_payments_to(AccountId(5));
        m.withdraw(AccountId(5)).unwrap();
        assert_eq!(m.metrics().claims_outstanding.get(), 0);
    }

    #[test]
    fn zero_payout_is_a_noop() {
        let mut m = market();
        assert!(m.pay_or_credit(AccountId(5), 0, "test").unwrap());
        assert!(m.rail().payments().is_empty());
    }

    #[test]
    fn fee_change_requires_owner_and_cap() {
        let mut m = market();
        let owner = m.config().platform_owner;
        assert!(matches!(
            m.set_market_fee(AccountId(999), Bps::ZERO),
            Err(MarketError::Unauthorized(_))
        ));
        m.set_market_fee(owner, Bps::new(300).unwrap()).unwrap();
        assert_eq!(m.market_fee().get(), 300);
        assert!(m.set_market_fee(owner, Bps::new(1_001).unwrap()).is_err());
    }
}
