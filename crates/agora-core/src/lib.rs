//! Agora: a multi-modal marketplace engine for semi-fungible tokens.
//!
//! A single token supply (identified by `(contract, token_id)`, EIP-1155
//! semantics) can be split across four concurrent trade modes: fixed-price
//! sale, English auction, raffle, and collateralized loan. The engine takes
//! custody of units placed into a trade mode, settles proceeds through a
//! fixed royalty -> platform fee -> seller pipeline, and returns units to
//! ownership positions on completion or cancellation.
//!
//! The external SFT ledger, the payment rail, wall-clock time, and raffle
//! winner selection are all injected capabilities (see [`ledger`],
//! [`payments`], [`clock`], [`rng`]); the engine itself is deterministic
//! given those seams.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod auction;
pub mod claims;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod loan;
pub mod metrics;
pub mod payments;
pub mod positions;
pub mod query;
pub mod raffle;
pub mod registry;
pub mod rng;
pub mod sale;
pub mod settlement;

pub use config::MarketConfig;
pub use engine::Market;
pub use events::MarketEvent;

/// Native-currency amount in smallest units.
pub type Value = u128;

/// Token unit count for one `(contract, token_id)`.
pub type Units = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

pub const BPS_U16: u16 = 10_000;
pub const BPS_DENOM: u128 = 10_000;

/// Stable account identifier. Callers are authenticated upstream; the engine
/// only requires identifiers to be stable and comparable.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountId(pub u64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

/// SFT contract identifier on the external ledger.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ContractId(pub u64);

/// Identity of one semi-fungible token: `(contract, token_id)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenRef {
    pub contract: ContractId,
    pub token_id: u64,
}

impl TokenRef {
    pub fn new(contract: ContractId, token_id: u64) -> TokenRef {
        TokenRef { contract, token_id }
    }
}

/// Engine-assigned item identifier (`>= 1`, monotonic).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemId(pub u64);

/// Engine-assigned position identifier (`>= 1`, monotonic).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PositionId(pub u64);

/// Basis points in `[0, 10_000]` (correct-by-construction).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(BPS_U16);

    /// Constructs a bounded bps value.
    ///
    /// Preconditions:
    /// - `v <= 10_000` (else returns an error; fail-closed).
    ///
    /// Postconditions:
    /// - `self.get()` is always in `[0, 10_000]` and can be used without
    ///   re-checking.
    pub fn new(v: u16) -> Result<Bps> {
        if v <= BPS_U16 {
            Ok(Bps(v))
        } else {
            Err(MarketError::BadParameter(format!(
                "bps out of range: {v} > {BPS_U16}"
            )))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u128(self) -> u128 {
        self.0 as u128
    }
}

impl TryFrom<u16> for Bps {
    type Error = MarketError;
    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Bps::new(value)
    }
}

impl From<Bps> for u16 {
    fn from(value: Bps) -> u16 {
        value.0
    }
}

/// Trade-mode state of a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PositionState {
    /// Units held by their owner, not committed to any trade mode.
    Available,
    RegularSale,
    Auction,
    Raffle,
    Loan,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PositionState::Available => "available",
            PositionState::RegularSale => "regular-sale",
            PositionState::Auction => "auction",
            PositionState::Raffle => "raffle",
            PositionState::Loan => "loan",
        };
        f.write_str(s)
    }
}

/// One completed trade, appended to the item's lifetime sale history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSale {
    pub seller: AccountId,
    pub buyer: AccountId,
    /// Gross value the buyer paid.
    pub price: Value,
    pub amount: Units,
}

/// A bucket of `amount` units of one item, held by one owner in one state.
///
/// `fee_snapshot` is the platform fee rate captured at position creation and
/// used at settlement, so an admin fee change mid-trade cannot affect an
/// already-open position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: PositionId,
    pub item_id: ItemId,
    pub owner: AccountId,
    pub amount: Units,
    pub price: Value,
    pub fee_snapshot: Bps,
    pub state: PositionState,
}

/// Engine identity for a `(contract, token_id)` pair plus its sale history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub token: TokenRef,
    /// First registrant.
    pub creator: AccountId,
    pub position_count: u64,
    pub sales: Vec<ItemSale>,
}

/// Unified error type for engine operations.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("item {0:?} not found")]
    ItemNotFound(ItemId),

    #[error("position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("position {position:?} is {actual}, operation requires {required}")]
    WrongState {
        position: PositionId,
        required: PositionState,
        actual: PositionState,
    },

    #[error("item already registered for {0:?}")]
    AlreadyExists(TokenRef),

    #[error("caller is not the {0}")]
    Unauthorized(&'static str),

    #[error("caller holds no units of this token")]
    NoBalance,

    #[error("insufficient units: need {needed}, have {held}")]
    InsufficientBalance { needed: Units, held: Units },

    #[error("bad payable value: required {required}, got {got}")]
    BadValue { required: Value, got: Value },

    #[error("deadline not reached: now {now} <= deadline {deadline}")]
    DeadlineNotReached { deadline: Timestamp, now: Timestamp },

    #[error("deadline exceeded: now {now} > deadline {deadline}")]
    DeadlineExceeded { deadline: Timestamp, now: Timestamp },

    #[error("bad parameter: {0}")]
    BadParameter(String),

    #[error("loan {0:?} is already funded")]
    AlreadyFunded(PositionId),

    #[error("reentrant call rejected")]
    Reentrancy,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("ledger rejected custody transfer: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("payout to {to} failed and was not claimable: {reason}")]
    PaymentFailed { to: AccountId, reason: String },

    #[error("position cap reached for item {item:?}: {limit}")]
    CapacityExceeded { item: ItemId, limit: usize },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_rejects_out_of_range() {
        assert!(Bps::new(10_000).is_ok());
        assert!(Bps::new(10_001).is_err());
    }

    #[test]
    fn bps_roundtrips_serde() {
        let b = Bps::new(250).unwrap();
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "250");
        let back: Bps = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
        assert!(serde_json::from_str::<Bps>("10001").is_err());
    }

    #[test]
    fn account_display_is_stable() {
        assert_eq!(AccountId(7).to_string(), "acct:7");
    }
}
