//! Collateralized loan.
//!
//! A borrower escrows token units against a requested principal. Funding
//! fixes the lender and the repayment deadline; repayment releases the
//! collateral back to the borrower, a missed deadline lets the lender
//! liquidate it.

use crate::clock::Clock;
use crate::engine::Market;
use crate::ledger::LedgerGateway;
use crate::payments::PaymentRail;
use crate::rng::WinnerSource;
use crate::settlement;
use crate::{
    AccountId, ItemId, MarketError, PositionId, PositionState, Result, Timestamp, Units, Value,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Duration bounds: one minute to roughly five years, in minutes.
pub const MIN_LOAN_MINUTES: u64 = 1;
pub const MAX_LOAN_MINUTES: u64 = 2_628_000;

/// Sidecar state of one loan position. `deadline` is zero until funding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanData {
    pub loan_amount: Value,
    pub fee_amount: Value,
    pub duration_minutes: u64,
    pub lender: Option<AccountId>,
    pub deadline: Timestamp,
}

impl<L, P, C, W> Market<L, P, C, W>
where
    L: LedgerGateway,
    P: PaymentRail,
    C: Clock,
    W: WinnerSource,
{
    /// Pledge `token_units` as collateral for a loan request.
    #[instrument(skip(self))]
    pub fn create_loan(
        &mut self,
        caller: AccountId,
        item_id: ItemId,
        token_units: Units,
        loan_amount: Value,
        fee_amount: Value,
        duration_minutes: u64,
    ) -> Result<PositionId> {
        self.guarded(|market| {
            if token_units == 0 {
                return Err(MarketError::BadParameter("token units must be > 0".into()));
            }
            if loan_amount == 0 {
                return Err(MarketError::BadParameter("loan amount must be > 0".into()));
            }
            if !(MIN_LOAN_MINUTES..=MAX_LOAN_MINUTES).contains(&duration_minutes) {
                return Err(MarketError::BadParameter(format!(
                    "loan duration {duration_minutes}min outside \
                     [{MIN_LOAN_MINUTES}, {MAX_LOAN_MINUTES}]"
                )));
            }
            let token = market.items.get(item_id)?.token;
            let held = market.ledger.balance_of(caller, token);
            if held < token_units {
                return Err(MarketError::InsufficientBalance {
                    needed: token_units,
                    held,
                });
            }
            market.ingest_custody(caller, token, token_units)?;
            let position_id = market.open_position(
                item_id,
                caller,
                token_units,
                loan_amount,
                PositionState::Loan,
            )?;
            market.loans.insert(
                position_id,
                LoanData {
                    loan_amount,
                    fee_amount,
                    duration_minutes,
                    lender: None,
                    deadline: 0,
                },
            );
            market.sync_available_for(item_id, caller)?;
            info!(
                position = position_id.0,
                item = item_id.0,
                collateral = token_units,
                principal = %loan_amount,
                "loan requested"
            );
            Ok(position_id)
        })
    }

    /// Fund an open loan with exactly the requested principal.
    ///
    /// Fixes the lender and starts the repayment clock; the principal goes
    /// to the borrower (claimable if the rail fails).
    #[instrument(skip(self))]
    pub fn fund_loan(
        &mut self,
        lender: AccountId,
        position_id: PositionId,
        value: Value,
    ) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::Loan)?
                .clone();
            let now = market.clock.now();
            let data = market
                .loans
                .get_mut(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?;
            if data.lender.is_some() {
                return Err(MarketError::AlreadyFunded(position_id));
            }
            if value != data.loan_amount {
                return Err(MarketError::BadValue {
                    required: data.loan_amount,
                    got: value,
                });
            }
            data.lender = Some(lender);
            data.deadline = now + data.duration_minutes * 60;
            let deadline = data.deadline;

            market.pay_or_credit(position.owner, value, "loan principal")?;
            info!(
                position = position_id.0,
                lender = lender.0,
                principal = %value,
                deadline,
                "loan funded"
            );
            Ok(())
        })
    }

    /// Repay a funded loan with `value >= loan_amount + fee_amount`.
    ///
    /// Any account may repay; the payoff goes to the lender and the
    /// collateral always returns to the borrower.
    #[instrument(skip(self))]
    pub fn repay_loan(
        &mut self,
        _payer: AccountId,
        position_id: PositionId,
        value: Value,
    ) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::Loan)?
                .clone();
            let data = market
                .loans
                .get(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?
                .clone();
            let lender = data
                .lender
                .ok_or_else(|| MarketError::BadParameter("loan is not funded".into()))?;
            let payoff = settlement::add_value(data.loan_amount, data.fee_amount)?;
            if value < payoff {
                return Err(MarketError::BadValue {
                    required: payoff,
                    got: value,
                });
            }
            let token = market.items.get(position.item_id)?.token;

            market.delete_position(position_id)?;
            market.pay_or_credit(lender, value, "loan payoff")?;
            market.release_custody(position.owner, token, position.amount)?;
            market.sync_available_for(position.item_id, position.owner)?;
            market.metrics.loans_closed.inc();
            info!(
                position = position_id.0,
                payoff = %value,
                "loan repaid"
            );
            Ok(())
        })
    }

    /// Seize the collateral after the repayment deadline. Lender only.
    #[instrument(skip(self))]
    pub fn liquidate(&mut self, caller: AccountId, position_id: PositionId) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::Loan)?
                .clone();
            let data = market
                .loans
                .get(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?
                .clone();
            if data.lender != Some(caller) {
                return Err(MarketError::Unauthorized("lender"));
            }
            let now = market.clock.now();
            if now <= data.deadline {
                return Err(MarketError::DeadlineNotReached {
                    deadline: data.deadline,
                    now,
                });
            }
            let token = market.items.get(position.item_id)?.token;

            market.delete_position(position_id)?;
            market.release_custody(caller, token, position.amount)?;
            market.sync_available_for(position.item_id, caller)?;
            market.metrics.loans_closed.inc();
            info!(
                position = position_id.0,
                lender = caller.0,
                collateral = position.amount,
                "loan liquidated"
            );
            Ok(())
        })
    }

    /// Withdraw an unfunded loan request. Borrower only.
    #[instrument(skip(self))]
    pub fn unlist_loan(&mut self, caller: AccountId, position_id: PositionId) -> Result<()> {
        self.guarded(|market| {
            let position = market
                .position_in_state(position_id, PositionState::Loan)?
                .clone();
            if position.owner != caller {
                return Err(MarketError::Unauthorized("borrower"));
            }
            let data = market
                .loans
                .get(&position_id)
                .ok_or(MarketError::PositionNotFound(position_id))?;
            if data.lender.is_some() {
                return Err(MarketError::AlreadyFunded(position_id));
            }
            let token = market.items.get(position.item_id)?.token;

            market.delete_position(position_id)?;
            market.release_custody(caller, token, position.amount)?;
            market.sync_available_for(position.item_id, caller)?;
            info!(position = position_id.0, "loan unlisted");
            Ok(())
        })
    }
}
