//! Failures surfaced by the arbitrage engine.
//!
//! Every variant is fatal to the operation that raised it. Failures raised while a
//! cycle is in flight also unwind every custody mutation made by that cycle.

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

/// Errors returned by engine operations and collaborator callbacks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The caller is not allowed to perform the operation
    #[error("Caller {0} is not authorized")]
    Unauthorized(Address),

    /// Exchange index is out of bounds
    #[error("Exchange index {index} is out of bounds ({count} registered)")]
    InvalidIndex {
        /// The requested index
        index: usize,
        /// Number of registered exchanges
        count: usize,
    },

    /// A path needs at least two tokens
    #[error("Path must contain at least 2 tokens, got {0}")]
    PathTooShort(usize),

    /// The hop list does not match the token list
    #[error("Path needs {expected} hops, got {hops}")]
    HopCountMismatch {
        /// Number of hops the token list requires
        expected: usize,
        /// Number of exchange hops supplied
        hops: usize,
    },

    /// A hop references an unknown or inactive exchange
    #[error("Hop {hop} references unknown or inactive exchange {index}")]
    InvalidExchangeReference {
        /// Position of the hop in the path
        hop: usize,
        /// The referenced exchange index
        index: usize,
    },

    /// No path is stored under the key
    #[error("Arbitrage path {0} not found")]
    PathNotFound(B256),

    /// The path exists but is switched off
    #[error("Arbitrage path {0} is inactive")]
    PathInactive(B256),

    /// Loan amount of zero
    #[error("Loan amount must be greater than zero")]
    ZeroAmount,

    /// Another cycle is in flight
    #[error("An arbitrage cycle is already active")]
    CycleAlreadyActive,

    /// The loan callback did not come from the registered lender
    #[error("Loan callback from {0} is not the registered lender")]
    UnauthorizedCallback(Address),

    /// The loan was initiated by someone other than the engine
    #[error("Loan was initiated by {0}, not by this engine")]
    ForeignInitiator(Address),

    /// The callback does not match the loan the engine requested
    #[error("Unexpected loan callback: {0}")]
    UnexpectedCallback(String),

    /// No venue implementation is wired for the exchange address
    #[error("No venue is wired for exchange {index} at {venue}")]
    UnknownVenue {
        /// Exchange index used by the hop
        index: usize,
        /// Venue address from the descriptor
        venue: Address,
    },

    /// The venue rejected or failed the swap
    #[error("Swap on {venue} failed: {reason}")]
    SwapFailed {
        /// Venue address
        venue: Address,
        /// Reason reported by the venue
        reason: String,
    },

    /// The swap settled after its deadline
    #[error("Swap on {venue} settled at {settled_at}, after deadline {deadline}")]
    DeadlineExceeded {
        /// Venue address
        venue: Address,
        /// Deadline attached to the swap
        deadline: u64,
        /// Clock reading once the swap returned
        settled_at: u64,
    },

    /// Custody does not hold enough of an asset
    #[error("Insufficient balance of {asset}: have {available}, need {required}")]
    InsufficientBalance {
        /// Asset address
        asset: Address,
        /// Balance held in custody
        available: U256,
        /// Amount requested
        required: U256,
    },

    /// The swap chain did not return enough to repay the loan
    #[error("Insufficient profit: final balance {balance} does not cover debt {debt}")]
    InsufficientProfit {
        /// Final balance of the borrowed asset
        balance: U256,
        /// Borrowed amount plus premium
        debt: U256,
    },

    /// The lender tried to pull more than it was approved for
    #[error("Repayment of {requested} exceeds approved {approved}")]
    AllowanceExceeded {
        /// Approved amount
        approved: U256,
        /// Requested amount
        requested: U256,
    },

    /// The lender returned without delivering the loan
    #[error("Lender returned without delivering the loan")]
    LoanNotDelivered,

    /// The lender returned without collecting its debt
    #[error("Lender returned without collecting the debt")]
    RepaymentNotCollected,

    /// The lender itself refused or failed the loan
    #[error("Lender failed: {0}")]
    LenderFailed(String),

    /// The quote source could not price a hop
    #[error("No quote for hop {hop} ({token_in} -> {token_out})")]
    QuoteUnavailable {
        /// Position of the hop in the path
        hop: usize,
        /// Input token
        token_in: Address,
        /// Output token
        token_out: Address,
    },

    /// Withdrawal of an empty balance
    #[error("Nothing to withdraw for {0}")]
    NothingToWithdraw(Address),
}
