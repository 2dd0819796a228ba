//! Contracts of the external parties the engine talks to.
//!
//! The lender and the venues are not implemented here. They are injected into the
//! engine at construction and trusted only as far as their identity checks go.

use alloy::primitives::{Address, Bytes, U256};
use chrono::Utc;
use eyre::Result;

use super::engine::ArbitrageEngine;
use super::types::{Asset, Timestamp};
use crate::errors::EngineError;

/// Flash-loan provider
pub trait Lender {
    /// Identity the loan callback must come from
    fn address(&self) -> Address;

    /// Lends `amount` of `asset` to `receiver` for the duration of the call.
    ///
    /// The lender must call [`ArbitrageEngine::on_loan_received`] exactly once, then collect
    /// `amount + premium` through [`ArbitrageEngine::collect_repayment`]. Any error from the
    /// receiver must be returned unchanged.
    ///
    /// # Errors
    ///
    /// Receiver errors, or `LenderFailed` if the lender cannot serve the loan
    fn flash_loan(
        &self,
        receiver: &ArbitrageEngine,
        asset: Asset,
        amount: U256,
        params: &Bytes,
    ) -> Result<(), EngineError>;
}

/// Swap venue (router)
pub trait Venue {
    /// Swaps `amount_in` of `token_path[0]` for the last token of `token_path` and sends the
    /// output to `recipient`. Must refuse to execute after `deadline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the swap cannot be executed
    fn swap(
        &self,
        amount_in: U256,
        min_amount_out: U256,
        token_path: &[Address],
        recipient: Address,
        deadline: Timestamp,
    ) -> Result<U256>;
}

/// Source of the current time
pub trait Clock {
    /// Current unix time in seconds
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        u64::try_from(Utc::now().timestamp()).unwrap_or_default()
    }
}
