//! Engine configuration.
//!
//! Configuration can come from programmatic defaults, the builder, or
//! environment variables prefixed with `AGORA_`. All paths validate
//! fail-closed before an engine is constructed.

use crate::{AccountId, Bps, MarketError, Result};
use serde::{Deserialize, Serialize};

/// Hard cap on the platform fee: 1000 bps (10%).
pub const MAX_MARKET_FEE_BPS: u16 = 1_000;

/// Royalty quotes above this share of gross are rejected at settlement.
pub const ROYALTY_CAP_BPS: u16 = 5_000;

/// Complete engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Account that receives platform fees and may change the fee rate.
    pub platform_owner: AccountId,

    /// The engine's own account on the SFT ledger; holds all trade custody.
    pub custody_account: AccountId,

    /// Initial platform fee rate. Snapshotted into each position at creation.
    pub market_fee: Bps,

    /// Per-item open-position cap (fail-closed).
    pub max_positions_per_item: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            platform_owner: AccountId(1),
            custody_account: AccountId(0),
            market_fee: Bps::ZERO,
            max_positions_per_item: 1_024,
        }
    }
}

impl MarketConfig {
    pub fn builder() -> MarketConfigBuilder {
        MarketConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// - `AGORA_PLATFORM_OWNER` - numeric platform-owner account id
    /// - `AGORA_CUSTODY_ACCOUNT` - numeric custody account id
    /// - `AGORA_MARKET_FEE_BPS` - initial fee rate in basis points
    /// - `AGORA_MAX_POSITIONS_PER_ITEM` - per-item position cap
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("AGORA_PLATFORM_OWNER") {
            config.platform_owner = AccountId(v.parse().map_err(|e| {
                MarketError::ConfigError(format!("invalid AGORA_PLATFORM_OWNER: {e}"))
            })?);
        }

        if let Ok(v) = std::env::var("AGORA_CUSTODY_ACCOUNT") {
            config.custody_account = AccountId(v.parse().map_err(|e| {
                MarketError::ConfigError(format!("invalid AGORA_CUSTODY_ACCOUNT: {e}"))
            })?);
        }

        if let Ok(v) = std::env::var("AGORA_MARKET_FEE_BPS") {
            let raw: u16 = v.parse().map_err(|e| {
                MarketError::ConfigError(format!("invalid AGORA_MARKET_FEE_BPS: {e}"))
            })?;
            config.market_fee = Bps::new(raw)?;
        }

        if let Ok(v) = std::env::var("AGORA_MAX_POSITIONS_PER_ITEM") {
            config.max_positions_per_item = v.parse().map_err(|e| {
                MarketError::ConfigError(format!("invalid AGORA_MAX_POSITIONS_PER_ITEM: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.market_fee.get() > MAX_MARKET_FEE_BPS {
            return Err(MarketError::ConfigError(format!(
                "market fee {} bps exceeds cap {} bps",
                self.market_fee.get(),
                MAX_MARKET_FEE_BPS
            )));
        }
        if self.max_positions_per_item == 0 {
            return Err(MarketError::ConfigError(
                "max_positions_per_item must be > 0".into(),
            ));
        }
        if self.platform_owner == self.custody_account {
            return Err(MarketError::ConfigError(
                "platform owner and custody account must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`MarketConfig`].
#[derive(Clone, Debug, Default)]
pub struct MarketConfigBuilder {
    config: MarketConfig,
}

impl MarketConfigBuilder {
    pub fn platform_owner(mut self, account: AccountId) -> Self {
        self.config.platform_owner = account;
        self
    }

    pub fn custody_account(mut self, account: AccountId) -> Self {
        self.config.custody_account = account;
        self
    }

    pub fn market_fee(mut self, fee: Bps) -> Self {
        self.config.market_fee = fee;
        self
    }

    pub fn max_positions_per_item(mut self, cap: usize) -> Self {
        self.config.max_positions_per_item = cap;
        self
    }

    pub fn build(self) -> Result<MarketConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MarketConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_fee_over_cap() {
        let err = MarketConfig::builder()
            .market_fee(Bps::new(1_001).unwrap())
            .build();
        assert!(matches!(err, Err(MarketError::ConfigError(_))));
    }

    #[test]
    fn builder_rejects_owner_as_custody() {
        let err = MarketConfig::builder()
            .platform_owner(AccountId(5))
            .custody_account(AccountId(5))
            .build();
        assert!(matches!(err, Err(MarketError::ConfigError(_))));
    }
}
