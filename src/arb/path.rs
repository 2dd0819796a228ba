/// Registry of multi-hop arbitrage routes keyed by their content hash.
///
/// A path is a token sequence `tokens[0] -> tokens[1] -> ... -> tokens[n]` where hop `i`
/// trades `tokens[i]` for `tokens[i + 1]` on exchange `exchange_hops[i]`. The key is a
/// keccak256 over the ABI-encoded sequences, so registering the same route twice always
/// lands on the same record.
use std::collections::HashMap;
use std::fmt::{self, Debug};

use alloy::primitives::{keccak256, Address, U256};
use alloy::sol_types::SolValue;
use itertools::Itertools;
use serde::Serialize;

use super::exchange::ExchangeRegistry;
use super::types::{ExchangeIndex, PathKey};
use crate::errors::EngineError;

/// A stored arbitrage route
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArbitragePath {
    /// Ordered token sequence, at least two long
    pub tokens: Vec<Address>,
    /// Exchange used for each hop, `tokens.len() - 1` long
    pub exchange_hops: Vec<ExchangeIndex>,
    /// Whether the path may be executed
    pub active: bool,
}

impl Debug for ArbitragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Path({}{})",
            self.hops()
                .map(|(token_in, token_out, exchange)| format!("{token_in} -[{exchange}]> {token_out}"))
                .join(", "),
            if self.active { "" } else { ", inactive" }
        )
    }
}

impl ArbitragePath {
    /// Whether this is a real record. Absent paths come back as the zero value.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// The asset that is borrowed and must be repaid
    #[must_use]
    pub fn borrowed_asset(&self) -> Option<Address> {
        self.tokens.first().copied()
    }

    /// Iterates hops as `(token_in, token_out, exchange)`
    pub fn hops(&self) -> impl Iterator<Item = (Address, Address, ExchangeIndex)> + '_ {
        self.tokens
            .iter()
            .copied()
            .tuple_windows()
            .zip(self.exchange_hops.iter().copied())
            .map(|((token_in, token_out), exchange)| (token_in, token_out, exchange))
    }

    /// Whether the route ends on the asset it started from
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tokens.len() >= 2 && self.tokens.first() == self.tokens.last()
    }
}

/// Computes the deterministic key of a route.
///
/// `keccak256(abi.encode(address[] tokens, uint256[] hops))`
#[must_use]
pub fn path_key(tokens: &[Address], exchange_hops: &[ExchangeIndex]) -> PathKey {
    let hops: Vec<U256> = exchange_hops.iter().map(|hop| U256::from(*hop)).collect();
    keccak256((tokens.to_vec(), hops).abi_encode())
}

/// Checks the structure of a route against the exchange registry.
///
/// # Errors
///
/// * `PathTooShort` if fewer than two tokens are given
/// * `HopCountMismatch` if the hop count is not `tokens.len() - 1`
/// * `InvalidExchangeReference` if a hop points to an unknown or inactive exchange
pub fn validate(
    tokens: &[Address],
    exchange_hops: &[ExchangeIndex],
    exchanges: &ExchangeRegistry,
) -> Result<(), EngineError> {
    if tokens.len() < 2 {
        return Err(EngineError::PathTooShort(tokens.len()));
    }
    if exchange_hops.len() != tokens.len() - 1 {
        return Err(EngineError::HopCountMismatch {
            expected: tokens.len() - 1,
            hops: exchange_hops.len(),
        });
    }
    if let Some((hop, index)) = exchange_hops
        .iter()
        .copied()
        .enumerate()
        .find(|(_, index)| exchanges.get_active(*index).is_none())
    {
        return Err(EngineError::InvalidExchangeReference { hop, index });
    }
    Ok(())
}

/// Paths keyed by content hash, plus the order in which keys were first seen
#[derive(Debug, Clone, Default)]
pub struct PathRegistry {
    /// Stored routes
    paths: HashMap<PathKey, ArbitragePath>,
    /// Keys in first-registration order. Only grows.
    keys: Vec<PathKey>,
}

impl PathRegistry {
    /// Validates and stores a route as active, returning its key.
    ///
    /// Re-adding an identical route refreshes the stored record and keeps the key count.
    ///
    /// # Errors
    ///
    /// Any error from [`validate`]
    pub fn add(
        &mut self,
        tokens: Vec<Address>,
        exchange_hops: Vec<ExchangeIndex>,
        exchanges: &ExchangeRegistry,
    ) -> Result<PathKey, EngineError> {
        validate(&tokens, &exchange_hops, exchanges)?;

        let key = path_key(&tokens, &exchange_hops);
        let previous = self.paths.insert(
            key,
            ArbitragePath {
                tokens,
                exchange_hops,
                active: true,
            },
        );
        if previous.is_none() {
            self.keys.push(key);
        }
        Ok(key)
    }

    /// Flips the active flag of a stored route.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if nothing is stored under `key`
    pub fn set_active(&mut self, key: PathKey, active: bool) -> Result<(), EngineError> {
        match self.paths.get_mut(&key) {
            Some(path) if path.exists() => {
                path.active = active;
                Ok(())
            }
            _ => Err(EngineError::PathNotFound(key)),
        }
    }

    /// Returns the stored route, or the zero value when absent
    #[must_use]
    pub fn get(&self, key: &PathKey) -> ArbitragePath {
        self.paths.get(key).cloned().unwrap_or_default()
    }

    /// Returns the stored route only if it exists and is active.
    ///
    /// # Errors
    ///
    /// `PathNotFound` or `PathInactive`
    pub fn get_executable(&self, key: &PathKey) -> Result<&ArbitragePath, EngineError> {
        let path = self
            .paths
            .get(key)
            .filter(|path| path.exists())
            .ok_or(EngineError::PathNotFound(*key))?;
        if !path.active {
            return Err(EngineError::PathInactive(*key));
        }
        Ok(path)
    }

    /// Keys in registration order
    #[must_use]
    pub fn keys(&self) -> &[PathKey] {
        &self.keys
    }

    /// Number of distinct routes ever registered
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no route has been registered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    fn registry_with(count: usize) -> ExchangeRegistry {
        let mut exchanges = ExchangeRegistry::default();
        for i in 0..count {
            exchanges.add(addr(&format!("V{i}")), format!("Venue {i}"));
        }
        exchanges
    }

    #[test]
    fn test_key_is_deterministic() {
        let key1 = path_key(&tokens(&["A", "B", "A"]), &[0, 1]);
        let key2 = path_key(&tokens(&["A", "B", "A"]), &[0, 1]);
        assert_eq!(key1, key2);

        assert_ne!(key1, path_key(&tokens(&["A", "B", "A"]), &[1, 0]));
        assert_ne!(key1, path_key(&tokens(&["B", "A", "B"]), &[0, 1]));
    }

    #[test]
    fn test_add_is_idempotent() {
        let exchanges = registry_with(2);
        let mut paths = PathRegistry::default();

        let key1 = paths.add(tokens(&["A", "B", "A"]), vec![0, 1], &exchanges).unwrap();
        paths.set_active(key1, false).unwrap();
        let key2 = paths.add(tokens(&["A", "B", "A"]), vec![0, 1], &exchanges).unwrap();

        assert_eq!(key1, key2);
        assert_eq!(paths.len(), 1);
        // Re-registration refreshes the record
        assert!(paths.get(&key1).active);
    }

    #[test]
    fn test_add_hop_count_mismatch() {
        let exchanges = registry_with(1);
        let mut paths = PathRegistry::default();
        assert_eq!(
            paths.add(tokens(&["A", "B"]), vec![], &exchanges).err().unwrap(),
            EngineError::HopCountMismatch { expected: 1, hops: 0 }
        );
        assert!(paths.is_empty());
    }

    #[test]
    fn test_add_too_short() {
        let exchanges = registry_with(1);
        let mut paths = PathRegistry::default();
        assert_eq!(
            paths.add(tokens(&["A"]), vec![], &exchanges).err().unwrap(),
            EngineError::PathTooShort(1)
        );
    }

    #[test]
    fn test_add_unknown_exchange() {
        let exchanges = registry_with(1);
        let mut paths = PathRegistry::default();
        assert_eq!(
            paths
                .add(tokens(&["A", "B", "C"]), vec![0, 99], &exchanges)
                .err()
                .unwrap(),
            EngineError::InvalidExchangeReference { hop: 1, index: 99 }
        );
    }

    #[test]
    fn test_add_inactive_exchange() {
        let mut exchanges = registry_with(2);
        exchanges.update(1, addr("V1"), "Venue 1", false).unwrap();
        let mut paths = PathRegistry::default();
        assert_eq!(
            paths
                .add(tokens(&["A", "B", "A"]), vec![0, 1], &exchanges)
                .err()
                .unwrap(),
            EngineError::InvalidExchangeReference { hop: 1, index: 1 }
        );
    }

    #[test]
    fn test_missing_path_is_zero_value() {
        let paths = PathRegistry::default();
        let missing = paths.get(&PathKey::ZERO);
        assert!(!missing.exists());
        assert_eq!(missing, ArbitragePath::default());
        assert_eq!(
            paths.get_executable(&PathKey::ZERO).err().unwrap(),
            EngineError::PathNotFound(PathKey::ZERO)
        );
    }

    #[test]
    fn test_set_active() {
        let exchanges = registry_with(1);
        let mut paths = PathRegistry::default();
        let key = paths.add(tokens(&["A", "B"]), vec![0], &exchanges).unwrap();

        paths.set_active(key, false).unwrap();
        assert_eq!(
            paths.get_executable(&key).err().unwrap(),
            EngineError::PathInactive(key)
        );
        paths.set_active(key, true).unwrap();
        assert!(paths.get_executable(&key).is_ok());

        assert_eq!(
            paths.set_active(PathKey::ZERO, true).err().unwrap(),
            EngineError::PathNotFound(PathKey::ZERO)
        );
    }

    #[test]
    fn test_hops() {
        let path = ArbitragePath {
            tokens: tokens(&["A", "B", "C", "A"]),
            exchange_hops: vec![2, 0, 1],
            active: true,
        };
        let hops: Vec<_> = path.hops().collect();
        assert_eq!(
            hops,
            vec![
                (addr("A"), addr("B"), 2),
                (addr("B"), addr("C"), 0),
                (addr("C"), addr("A"), 1),
            ]
        );
        assert!(path.is_closed());
        assert_eq!(path.borrowed_asset(), Some(addr("A")));
    }
}
