//! # Arbitrage Module
//!
//! The flash-loan execution core: registries of exchanges and routes, the asset custody,
//! the cycle state machine and the read-only profitability estimator.

/// External collaborators: lender, venues, clock
pub mod collaborators;
/// Asset custody and its compensating journal
pub mod custody;
/// Cycle state machine and public surface
pub mod engine;
/// Read-only profitability estimation
pub mod estimator;
/// Notifications for external observers
pub mod events;
/// Exchange registry
pub mod exchange;
/// Path registry and content-hash keys
pub mod path;
/// Test helpers and utilities
#[cfg(test)]
pub(crate) mod test_helpers;
/// Common type definitions
pub mod types;
