//! Market-fee helpers.

use agora_core::clock::SystemClock;
use agora_core::ledger::InMemoryLedger;
use agora_core::payments::RecordingRail;
use agora_core::rng::SeededWinnerSource;
use agora_core::{Bps, Market, MarketConfig};
use anyhow::{Context, Result};

/// Print the fee rate the environment configuration resolves to.
pub fn get() -> Result<()> {
    let config = MarketConfig::from_env()?;
    println!("market fee: {} bps", config.market_fee.get());
    Ok(())
}

/// Validate a fee change against the cap by driving it through an engine.
pub fn set(bps: u16) -> Result<()> {
    let config = MarketConfig::from_env()?;
    let owner = config.platform_owner;
    let prev = config.market_fee;
    let fee = Bps::new(bps).context("invalid bps")?;

    let mut market = Market::new(
        config,
        InMemoryLedger::new(),
        RecordingRail::new(),
        SystemClock,
        SeededWinnerSource::from_seed(0),
    )?;
    market.set_market_fee(owner, fee)?;
    for event in market.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    println!("market fee: {} -> {} bps", prev.get(), fee.get());
    Ok(())
}
