use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use alloy::primitives::{Address, Bytes, U256};
use log::debug;

use crate::arb::collaborators::Lender;
use crate::arb::engine::ArbitrageEngine;
use crate::arb::types::Asset;
use crate::errors::EngineError;

/// Mutable state behind an `InMemoryLender` handle
#[derive(Debug, Default)]
struct LenderBook {
    /// Liquidity available per asset
    liquidity: HashMap<Asset, U256>,
    /// Loans requested, whether or not they succeeded
    requests: usize,
    /// Loans repaid in full
    served: usize,
}

/// Flash-loan pool holding liquidity in memory and charging a premium in bps
#[derive(Debug, Clone)]
pub struct InMemoryLender {
    /// Identity the callback comes from
    address: Address,
    /// Premium charged per loan, in basis points
    premium_bps: u32,
    /// Shared state
    book: Rc<RefCell<LenderBook>>,
}

impl InMemoryLender {
    /// Creates a lender with no liquidity
    #[must_use]
    pub fn new(address: Address, premium_bps: u32) -> Self {
        Self {
            address,
            premium_bps,
            book: Rc::default(),
        }
    }

    /// Adds liquidity for `asset`
    #[must_use]
    pub fn with_liquidity(self, asset: Asset, amount: U256) -> Self {
        {
            let mut book = self.book.borrow_mut();
            let liquidity = book.liquidity.entry(asset).or_default();
            *liquidity = liquidity.saturating_add(amount);
        }
        self
    }

    /// Premium charged on `amount`
    #[must_use]
    pub fn premium(&self, amount: U256) -> U256 {
        amount.saturating_mul(U256::from(self.premium_bps)) / U256::from(10_000)
    }

    /// Liquidity available for `asset`
    #[must_use]
    pub fn liquidity(&self, asset: &Asset) -> U256 {
        self.book
            .borrow()
            .liquidity
            .get(asset)
            .copied()
            .unwrap_or_default()
    }

    /// Number of loans requested
    #[must_use]
    pub fn requests(&self) -> usize {
        self.book.borrow().requests
    }

    /// Number of loans repaid in full
    #[must_use]
    pub fn served(&self) -> usize {
        self.book.borrow().served
    }
}

impl Lender for InMemoryLender {
    fn address(&self) -> Address {
        self.address
    }

    fn flash_loan(
        &self,
        receiver: &ArbitrageEngine,
        asset: Asset,
        amount: U256,
        params: &Bytes,
    ) -> Result<(), EngineError> {
        self.book.borrow_mut().requests += 1;
        let available = self.liquidity(&asset);
        if available < amount {
            return Err(EngineError::LenderFailed(format!(
                "insufficient liquidity: {available} {asset} available, {amount} requested"
            )));
        }

        let premium = self.premium(amount);
        receiver.on_loan_received(
            self.address,
            asset,
            amount,
            premium,
            receiver.address(),
            params,
        )?;
        receiver.collect_repayment(self.address, asset, amount.saturating_add(premium))?;

        // Pool state only moves once the loan is back
        let mut book = self.book.borrow_mut();
        let liquidity = book.liquidity.entry(asset).or_default();
        *liquidity = liquidity.saturating_add(premium);
        book.served += 1;
        debug!("lender: served {amount} {asset}, earned {premium}");
        Ok(())
    }
}
