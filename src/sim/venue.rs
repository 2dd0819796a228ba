use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use eyre::{bail, eyre, Result};

use crate::arb::collaborators::{Clock, Venue};
use crate::arb::types::Timestamp;

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Shared current time
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    /// Creates a clock reading `now`
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get().saturating_add(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Mutable state behind a `FixedRateVenue` handle
#[derive(Debug, Default)]
struct VenueBook {
    /// `(token_in, token_out) -> output per input, in bps`
    rates: HashMap<(Address, Address), u32>,
    /// Clock checked against deadlines and advanced by `latency_secs`
    clock: Option<ManualClock>,
    /// Time each swap takes
    latency_secs: u64,
    /// When set, every swap fails with this reason
    failure: Option<String>,
    /// Number of swaps executed
    swaps: usize,
}

/// Venue trading each pair at a fixed rate (`amount_out = amount_in * rate_bps / 10_000`)
#[derive(Debug, Clone, Default)]
pub struct FixedRateVenue {
    /// Shared state
    book: Rc<RefCell<VenueBook>>,
}

impl FixedRateVenue {
    /// Creates a venue with no pairs
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rate for `token_in -> token_out`
    #[must_use]
    pub fn with_rate(self, token_in: Address, token_out: Address, rate_bps: u32) -> Self {
        self.set_rate(token_in, token_out, rate_bps);
        self
    }

    /// Checks deadlines against `clock` and advances it by `latency_secs` per swap
    #[must_use]
    pub fn with_clock(self, clock: ManualClock, latency_secs: u64) -> Self {
        {
            let mut book = self.book.borrow_mut();
            book.clock = Some(clock);
            book.latency_secs = latency_secs;
        }
        self
    }

    /// Sets the rate for `token_in -> token_out`
    pub fn set_rate(&self, token_in: Address, token_out: Address, rate_bps: u32) {
        self.book
            .borrow_mut()
            .rates
            .insert((token_in, token_out), rate_bps);
    }

    /// Changes the time each swap takes
    pub fn set_latency(&self, secs: u64) {
        self.book.borrow_mut().latency_secs = secs;
    }

    /// Makes every following swap fail with `reason`, or heals the venue with `None`
    pub fn set_failure(&self, reason: Option<&str>) {
        self.book.borrow_mut().failure = reason.map(str::to_string);
    }

    /// Number of swaps executed so far
    #[must_use]
    pub fn swap_count(&self) -> usize {
        self.book.borrow().swaps
    }
}

impl Venue for FixedRateVenue {
    fn swap(
        &self,
        amount_in: U256,
        min_amount_out: U256,
        token_path: &[Address],
        _recipient: Address,
        deadline: Timestamp,
    ) -> Result<U256> {
        let mut book = self.book.borrow_mut();
        if let Some(reason) = &book.failure {
            bail!("{reason}");
        }
        if let Some(clock) = &book.clock {
            if clock.now() > deadline {
                bail!("EXPIRED");
            }
            clock.advance(book.latency_secs);
        }

        let (token_in, token_out) = match token_path {
            [token_in, .., token_out] => (*token_in, *token_out),
            _ => bail!("INVALID_PATH"),
        };
        let rate = book
            .rates
            .get(&(token_in, token_out))
            .copied()
            .ok_or_else(|| eyre!("no pair {token_in} -> {token_out}"))?;
        let amount_out = amount_in.saturating_mul(U256::from(rate)) / U256::from(10_000);
        if amount_out < min_amount_out {
            bail!("INSUFFICIENT_OUTPUT_AMOUNT");
        }
        book.swaps += 1;
        Ok(amount_out)
    }
}
