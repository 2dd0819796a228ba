/*!
 * # Flashfly - Flash-Loan Arbitrage Execution
 *
 * Flashfly executes multi-hop arbitrage cycles funded by flash loans: borrow an asset,
 * route it through a registered sequence of swap venues, repay the loan plus premium
 * and keep the surplus. A cycle either completes with enough to repay or leaves no
 * trace at all.
 *
 * ## Core Features
 *
 * - **Exchange and Path Registries**: Owner-managed venues and content-addressed routes
 * - **Atomic Cycles**: Journaled custody unwound on any failure
 * - **Lender Callback Protocol**: Authenticated, re-entrancy guarded loan callbacks
 * - **Estimation**: Read-only profitability checks before committing capital
 *
 * ## Module Structure
 *
 * - `arb`: Registries, custody and the cycle state machine
 * - `config`: Configuration management for the engine
 * - `errors`: Engine error type
 * - `notify`: Slack notifications
 * - `sim`: In-memory lender, venues and scenarios for dry runs
 * - `utils`: Utility functions and helpers
 */

/// Registries, custody and the cycle state machine
pub mod arb;
/// Configuration management for the engine
pub mod config;
/// Engine error type
pub mod errors;
/// Slack notifications
pub mod notify;
/// In-memory collaborators and scenarios
pub mod sim;
/// Utility functions and helpers
pub mod utils;
