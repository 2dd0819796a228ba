use alloy::primitives::{Address, B256};

/// Index of an exchange in the registry. Assigned append-only and never reused.
pub type ExchangeIndex = usize;

/// Content hash of a path's token and hop sequences
pub type PathKey = B256;

/// Asset identity (ERC-20 token address)
pub type Asset = Address;

/// Unix timestamp in seconds
pub type Timestamp = u64;
