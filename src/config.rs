use std::env;
use std::str::FromStr;

use eyre::{eyre, Result, WrapErr};

/// Default lifetime of a swap request, in seconds
pub const DEFAULT_SWAP_DEADLINE_SECS: u64 = 300;

/// Default premium assumed by the estimator, in basis points (Aave V3 charges 0.09%)
pub const DEFAULT_PREMIUM_BPS: u32 = 9;

/// Engine tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Seconds added to the current time to form each swap deadline
    pub swap_deadline_secs: u64,
    /// Flash-loan premium the estimator assumes, in basis points
    pub premium_bps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            swap_deadline_secs: DEFAULT_SWAP_DEADLINE_SECS,
            premium_bps: DEFAULT_PREMIUM_BPS,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from the environment, reading `.env` first if present.
    ///
    /// # Environment Variables
    /// * `FLASHFLY_SWAP_DEADLINE_SECS` - swap deadline offset (default 300)
    /// * `FLASHFLY_PREMIUM_BPS` - estimated lender premium (default 9)
    ///
    /// # Errors
    /// * If a variable is set but cannot be parsed
    /// * If the premium is above 10,000 bps
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            swap_deadline_secs: var_or("FLASHFLY_SWAP_DEADLINE_SECS", defaults.swap_deadline_secs)?,
            premium_bps: var_or("FLASHFLY_PREMIUM_BPS", defaults.premium_bps)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// * If the premium is above 10,000 bps
    pub fn validate(&self) -> Result<()> {
        if self.premium_bps > 10_000 {
            return Err(eyre!(
                "premium_bps must be at most 10000, got {}",
                self.premium_bps
            ));
        }
        Ok(())
    }
}

/// Parses an environment variable, falling back to `default` when it is unset
fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .wrap_err_with(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.swap_deadline_secs, 300);
        assert_eq!(config.premium_bps, 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_premium() {
        let config = EngineConfig {
            premium_bps: 10_001,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.validate().err().unwrap().to_string(),
            "premium_bps must be at most 10000, got 10001"
        );
    }

    #[test]
    fn test_var_or_falls_back() {
        let value: u64 = var_or("FLASHFLY_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
