/// Asset custody held by the engine, with a compensating journal.
///
/// Every mutation made while a cycle is in flight is recorded in the journal. Rolling back
/// replays the inverse of each entry in reverse order, which restores custody exactly as
/// it was when the journal was opened.
use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::errors::EngineError;

/// A single recorded custody mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// `amount` of `asset` was added
    Credit {
        /// Asset address
        asset: Address,
        /// Credited amount
        amount: U256,
    },
    /// `amount` of `asset` was removed
    Debit {
        /// Asset address
        asset: Address,
        /// Debited amount
        amount: U256,
    },
    /// The spender allowance for `asset` was changed from `previous`
    Allowance {
        /// Asset address
        asset: Address,
        /// Allowance before the change
        previous: U256,
    },
}

/// Balances per asset plus the allowance the lender may pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Custody {
    /// Balances held by the engine
    balances: HashMap<Address, U256>,
    /// Amount of each asset the lender is approved to collect
    allowances: HashMap<Address, U256>,
    /// Open journal, if a cycle is in flight
    journal: Option<Vec<JournalEntry>>,
}

impl Custody {
    /// Balance held for `asset`
    #[must_use]
    pub fn balance(&self, asset: &Address) -> U256 {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    /// Allowance approved for `asset`
    #[must_use]
    pub fn allowance(&self, asset: &Address) -> U256 {
        self.allowances.get(asset).copied().unwrap_or_default()
    }

    /// Adds `amount` of `asset`. Saturates at `U256::MAX`.
    pub fn credit(&mut self, asset: Address, amount: U256) {
        let balance = self.balances.entry(asset).or_default();
        *balance = balance.saturating_add(amount);
        self.record(JournalEntry::Credit { asset, amount });
    }

    /// Removes `amount` of `asset`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientBalance` if custody holds less than `amount`
    pub fn debit(&mut self, asset: Address, amount: U256) -> Result<(), EngineError> {
        let available = self.balance(&asset);
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                asset,
                available,
                required: amount,
            });
        }
        self.balances.insert(asset, available - amount);
        self.record(JournalEntry::Debit { asset, amount });
        Ok(())
    }

    /// Sets the allowance for `asset`
    pub fn approve(&mut self, asset: Address, amount: U256) {
        let previous = self.allowances.insert(asset, amount).unwrap_or_default();
        self.record(JournalEntry::Allowance { asset, previous });
    }

    /// Removes `amount` of `asset` against the allowance.
    ///
    /// # Errors
    ///
    /// * `AllowanceExceeded` if `amount` is above the approved allowance
    /// * `InsufficientBalance` if custody holds less than `amount`
    pub fn spend_allowance(&mut self, asset: Address, amount: U256) -> Result<(), EngineError> {
        let approved = self.allowance(&asset);
        if approved < amount {
            return Err(EngineError::AllowanceExceeded {
                approved,
                requested: amount,
            });
        }
        self.debit(asset, amount)?;
        self.approve(asset, approved - amount);
        Ok(())
    }

    /// Starts recording mutations. An already open journal is discarded.
    pub fn open_journal(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Whether a journal is open
    #[must_use]
    pub const fn is_journaling(&self) -> bool {
        self.journal.is_some()
    }

    /// Keeps every mutation and closes the journal
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undoes every journaled mutation in reverse order and closes the journal.
    /// Returns the number of entries undone.
    pub fn rollback(&mut self) -> usize {
        let Some(entries) = self.journal.take() else {
            return 0;
        };
        let count = entries.len();
        for entry in entries.into_iter().rev() {
            match entry {
                JournalEntry::Credit { asset, amount } => {
                    let balance = self.balances.entry(asset).or_default();
                    *balance = balance.saturating_sub(amount);
                }
                JournalEntry::Debit { asset, amount } => {
                    let balance = self.balances.entry(asset).or_default();
                    *balance = balance.saturating_add(amount);
                }
                JournalEntry::Allowance { asset, previous } => {
                    self.allowances.insert(asset, previous);
                }
            }
        }
        self.prune();
        count
    }

    /// Drops zero entries so that a rolled back custody compares equal to its snapshot
    fn prune(&mut self) {
        self.balances.retain(|_, balance| !balance.is_zero());
        self.allowances.retain(|_, allowance| !allowance.is_zero());
    }

    /// Appends to the journal if one is open
    fn record(&mut self, entry: JournalEntry) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(entry);
        }
    }

    /// Snapshot of every non-zero balance
    #[must_use]
    pub fn balances(&self) -> HashMap<Address, U256> {
        self.balances
            .iter()
            .filter(|(_, balance)| !balance.is_zero())
            .map(|(asset, balance)| (*asset, *balance))
            .collect()
    }
}
