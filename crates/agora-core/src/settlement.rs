//! Settlement pipeline.
//!
//! Proceeds of every completed trade are split in fixed order: royalty on
//! gross, platform fee on the post-royalty base, remainder to the seller,
//! then the unit custody transfer. Royalty first keeps the creator's cut a
//! function of gross; the fee base excludes royalty so royalty is not itself
//! taxed. All division floors; the rounding residue stays with the seller.

use crate::{AccountId, Bps, MarketError, Result, Value, BPS_DENOM};

/// Multiply then floor-divide with overflow checking.
pub fn mul_div_floor(a: Value, b: Value, denom: Value) -> Result<Value> {
    if denom == 0 {
        return Err(MarketError::BadParameter("division by zero".into()));
    }
    let num = a
        .checked_mul(b)
        .ok_or(MarketError::Overflow("u128 overflow in mul"))?;
    Ok(num / denom)
}

pub fn add_value(a: Value, b: Value) -> Result<Value> {
    a.checked_add(b).ok_or(MarketError::Overflow("value add"))
}

pub fn sub_value(a: Value, b: Value) -> Result<Value> {
    a.checked_sub(b)
        .ok_or(MarketError::Overflow("value underflow"))
}

/// `floor(amount * bps / 10_000)`.
pub fn floor_bps(amount: Value, bps: Bps) -> Result<Value> {
    mul_div_floor(amount, bps.as_u128(), BPS_DENOM)
}

/// The exact split of one gross settlement value.
///
/// Postconditions (checked by construction):
/// - `royalty + fee + seller_net == gross`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementPlan {
    pub gross: Value,
    /// `None` when the royalty step is skipped (no capability, no
    /// configuration, zero amount, or receiver == seller).
    pub royalty_receiver: Option<AccountId>,
    pub royalty: Value,
    pub fee: Value,
    pub seller_net: Value,
}

/// Compute the split for `gross` under the position's fee snapshot.
///
/// `royalty_quote` is the ledger's `royalty_info` answer, already `None`
/// when the ledger lacks the capability. The royalty step is skipped when
/// the receiver is the seller or the quoted amount is zero. A quote above
/// `royalty_cap` of gross is rejected before any payout so the seller's net
/// can never go negative.
pub fn plan(
    gross: Value,
    fee_snapshot: Bps,
    seller: AccountId,
    royalty_quote: Option<(AccountId, Value)>,
    royalty_cap: Bps,
) -> Result<SettlementPlan> {
    let (royalty_receiver, royalty) = match royalty_quote {
        Some((receiver, amount)) if receiver != seller && amount > 0 => {
            if amount > floor_bps(gross, royalty_cap)? {
                return Err(MarketError::BadParameter(format!(
                    "royalty {amount} exceeds {} bps of gross {gross}",
                    royalty_cap.get()
                )));
            }
            (Some(receiver), amount)
        }
        _ => (None, 0),
    };

    let fee_base = sub_value(gross, royalty)?;
    let fee = floor_bps(fee_base, fee_snapshot)?;
    let seller_net = sub_value(fee_base, fee)?;

    Ok(SettlementPlan {
        gross,
        royalty_receiver,
        royalty,
        fee,
        seller_net,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bps(v: u16) -> Bps {
        Bps::new(v).unwrap()
    }

    const SELLER: AccountId = AccountId(1);
    const ARTIST: AccountId = AccountId(9);

    #[test]
    fn split_is_exact() {
        // Gross 15, royalty 10% -> 1.5 floored to 1 by the ledger quote is
        // the ledger's business; here the quote is exact integer 1.
        let p = plan(15, bps(250), SELLER, Some((ARTIST, 1)), bps(5_000)).unwrap();
        assert_eq!(p.royalty, 1);
        assert_eq!(p.fee, 0); // floor(14 * 250 / 10000)
        assert_eq!(p.seller_net, 14);
        assert_eq!(p.royalty + p.fee + p.seller_net, p.gross);
    }

    #[test]
    fn royalty_to_seller_is_skipped() {
        let p = plan(100, bps(250), SELLER, Some((SELLER, 10)), bps(5_000)).unwrap();
        assert_eq!(p.royalty, 0);
        assert!(p.royalty_receiver.is_none());
        assert_eq!(p.fee, 2); // floor(100 * 250 / 10000)
        assert_eq!(p.seller_net, 98);
    }

    #[test]
    fn zero_royalty_quote_is_skipped() {
        let p = plan(100, bps(0), SELLER, Some((ARTIST, 0)), bps(5_000)).unwrap();
        assert!(p.royalty_receiver.is_none());
        assert_eq!(p.seller_net, 100);
    }

    #[test]
    fn royalty_above_cap_is_rejected() {
        let err = plan(100, bps(250), SELLER, Some((ARTIST, 51)), bps(5_000)).unwrap_err();
        assert!(matches!(err, MarketError::BadParameter(_)));
        // Exactly at cap is fine.
        assert!(plan(100, bps(250), SELLER, Some((ARTIST, 50)), bps(5_000)).is_ok());
    }

    #[test]
    fn fee_floors_and_residue_stays_with_seller() {
        let p = plan(999, bps(333), SELLER, None, bps(5_000)).unwrap();
        assert_eq!(p.fee, 33); // floor(999 * 333 / 10000) = floor(33.2667)
        assert_eq!(p.seller_net, 966);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn royalty_fee_net_always_sum_to_gross(
                gross in 0u128..=u64::MAX as u128,
                fee_bps in 0u16..=1_000,
                royalty_bps in 0u16..=5_000,
            ) {
                let quote = floor_bps(gross, bps(royalty_bps)).unwrap();
                let p = plan(
                    gross,
                    bps(fee_bps),
                    SELLER,
                    Some((ARTIST, quote)),
                    bps(5_000),
                )
                .unwrap();
                prop_assert_eq!(p.royalty + p.fee + p.seller_net, gross);
                prop_assert!(p.fee <= gross);
            }

            #[test]
            fn fee_never_exceeds_snapshot_share(
                gross in 1u128..=u64::MAX as u128,
                fee_bps in 0u16..=1_000,
            ) {
                let p = plan(gross, bps(fee_bps), SELLER, None, bps(5_000)).unwrap();
                prop_assert!(p.fee <= floor_bps(gross, bps(fee_bps)).unwrap());
            }
        }
    }
}
