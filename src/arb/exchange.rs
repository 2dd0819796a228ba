/// Registry of swap venues the engine may route through.
/// Exchanges are appended and updated in place, never removed. Deactivation only
/// blocks new paths from referencing them.
use std::fmt::{self, Display};

use alloy::primitives::Address;
use serde::Serialize;

use super::types::ExchangeIndex;
use crate::errors::EngineError;

/// A registered swap venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeDescriptor {
    /// Address of the venue (router) contract
    pub venue: Address,
    /// Display name, e.g. "Uniswap V2"
    pub name: String,
    /// Whether new paths may reference this exchange
    pub active: bool,
}

impl Display for ExchangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "inactive" };
        write!(f, "{} ({}, {state})", self.name, self.venue)
    }
}

/// Append-only list of exchanges
#[derive(Debug, Clone, Default)]
pub struct ExchangeRegistry {
    /// Descriptors indexed by their `ExchangeIndex`
    exchanges: Vec<ExchangeDescriptor>,
}

impl ExchangeRegistry {
    /// Appends a new active exchange and returns its index.
    ///
    /// Duplicate venue addresses are accepted.
    pub fn add(&mut self, venue: Address, name: impl Into<String>) -> ExchangeIndex {
        self.exchanges.push(ExchangeDescriptor {
            venue,
            name: name.into(),
            active: true,
        });
        self.exchanges.len() - 1
    }

    /// Overwrites every field of an existing exchange.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` if `index` is not registered
    pub fn update(
        &mut self,
        index: ExchangeIndex,
        venue: Address,
        name: impl Into<String>,
        active: bool,
    ) -> Result<&ExchangeDescriptor, EngineError> {
        let count = self.exchanges.len();
        let slot = self
            .exchanges
            .get_mut(index)
            .ok_or(EngineError::InvalidIndex { index, count })?;
        *slot = ExchangeDescriptor {
            venue,
            name: name.into(),
            active,
        };
        Ok(slot)
    }

    /// Looks up an exchange by index
    #[must_use]
    pub fn get(&self, index: ExchangeIndex) -> Option<&ExchangeDescriptor> {
        self.exchanges.get(index)
    }

    /// Looks up an exchange that exists and is currently active
    #[must_use]
    pub fn get_active(&self, index: ExchangeIndex) -> Option<&ExchangeDescriptor> {
        self.get(index).filter(|exchange| exchange.active)
    }

    /// Number of registered exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether no exchange has been registered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::addr;

    #[test]
    fn test_add_assigns_sequential_indices() {
        let mut registry = ExchangeRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.add(addr("V1"), "Uniswap"), 0);
        assert_eq!(registry.add(addr("V2"), "Sushi"), 1);
        // Same venue twice is the operator's business
        assert_eq!(registry.add(addr("V1"), "Uniswap again"), 2);
        assert_eq!(registry.len(), 3);
        assert!(registry.get(1).unwrap().active);
    }

    #[test]
    fn test_update_overwrites_all_fields() {
        let mut registry = ExchangeRegistry::default();
        registry.add(addr("V1"), "Uniswap");

        let updated = registry.update(0, addr("V9"), "Renamed", false).unwrap();
        assert_eq!(updated.venue, addr("V9"));
        assert_eq!(updated.name, "Renamed");
        assert!(!updated.active);
        assert!(registry.get_active(0).is_none());
        assert!(registry.get(0).is_some());
    }

    #[test]
    fn test_update_out_of_bounds() {
        let mut registry = ExchangeRegistry::default();
        registry.add(addr("V1"), "Uniswap");
        assert_eq!(
            registry.update(1, addr("V1"), "x", true).err().unwrap(),
            EngineError::InvalidIndex { index: 1, count: 1 }
        );
    }

    #[test]
    fn test_display() {
        let mut registry = ExchangeRegistry::default();
        registry.add(addr("V1"), "Uniswap");
        assert_eq!(
            registry.get(0).unwrap().to_string(),
            format!("Uniswap ({}, active)", addr("V1"))
        );
    }
}
