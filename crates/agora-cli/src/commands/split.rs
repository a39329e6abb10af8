//! Settlement-split calculator.

use agora_core::settlement::{self, floor_bps};
use agora_core::{AccountId, Bps};
use anyhow::{Context, Result};

const SELLER: AccountId = AccountId(1);
const ROYALTY_RECEIVER: AccountId = AccountId(2);

pub fn run(gross: u128, fee_bps: u16, royalty_bps: u16, royalty_to_seller: bool) -> Result<()> {
    let fee = Bps::new(fee_bps).context("invalid fee_bps")?;
    let royalty_rate = Bps::new(royalty_bps).context("invalid royalty_bps")?;
    let cap = Bps::new(agora_core::config::ROYALTY_CAP_BPS).expect("cap constant is in range");

    let quote = if royalty_bps == 0 {
        None
    } else {
        let receiver = if royalty_to_seller {
            SELLER
        } else {
            ROYALTY_RECEIVER
        };
        Some((receiver, floor_bps(gross, royalty_rate)?))
    };

    let plan = settlement::plan(gross, fee, SELLER, quote, cap)?;
    println!("gross:    {}", plan.gross);
    println!("royalty:  {}", plan.royalty);
    println!("fee:      {}", plan.fee);
    println!("seller:   {}", plan.seller_net);
    Ok(())
}
