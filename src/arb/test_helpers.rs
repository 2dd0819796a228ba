use alloy::primitives::{keccak256, Address, U256};
use tokio::sync::mpsc::UnboundedReceiver;

use super::collaborators::Lender;
use super::engine::ArbitrageEngine;
use super::events::EngineEvent;
use super::types::PathKey;
use crate::config::EngineConfig;
use crate::sim::{FixedRateVenue, InMemoryLender, ManualClock};

/// Premium charged by the test lender: 1000 borrowed costs 1
pub const PREMIUM_BPS: u32 = 10;

/// Deterministic address derived from a label
pub fn addr(label: &str) -> Address {
    Address::from_word(keccak256(label.as_bytes()))
}

/// Addresses for a list of labels
pub fn tokens(labels: &[&str]) -> Vec<Address> {
    labels.iter().map(|label| addr(label)).collect()
}

/// Engine owner
pub fn owner() -> Address {
    addr("OWNER")
}

/// Default loan size
pub fn amount() -> U256 {
    U256::from(1000)
}

/// Lender with plenty of token `A`
pub fn sim_lender() -> InMemoryLender {
    InMemoryLender::new(addr("LENDER"), PREMIUM_BPS).with_liquidity(addr("A"), U256::from(1_000_000))
}

/// An engine with two venues and one registered round trip `A -[0]> B -[1]> A`.
///
/// With the default rates a 1000 loan comes back as 1050, a profit of 49 after the premium.
pub struct Fixture {
    /// Engine under test
    pub engine: ArbitrageEngine,
    /// Liquidity pool behind the lender
    pub pool: InMemoryLender,
    /// Shared clock
    pub clock: ManualClock,
    /// Venue of exchange 0, `A -> B` at 2.0
    pub v0: FixedRateVenue,
    /// Venue of exchange 1, `B -> A` at 0.525
    pub v1: FixedRateVenue,
    /// Key of the round trip
    pub key: PathKey,
    /// Events published after setup
    pub events: UnboundedReceiver<EngineEvent>,
}

impl Fixture {
    /// Fixture with the plain in-memory lender
    pub fn new() -> Self {
        let pool = sim_lender();
        Self::with_lender(pool.clone(), pool)
    }

    /// Fixture with a custom lender in front of `pool`
    #[allow(clippy::unwrap_used)]
    pub fn with_lender(lender: impl Lender + 'static, pool: InMemoryLender) -> Self {
        let clock = ManualClock::new(1_700_000_000);
        let v0 = FixedRateVenue::new()
            .with_rate(addr("A"), addr("B"), 20_000)
            .with_clock(clock.clone(), 0);
        let v1 = FixedRateVenue::new()
            .with_rate(addr("B"), addr("A"), 5_250)
            .with_clock(clock.clone(), 0);

        let engine = ArbitrageEngine::new(addr("ENGINE"), owner(), lender, EngineConfig::default())
            .with_clock(clock.clone())
            .with_venue(addr("V0"), v0.clone())
            .with_venue(addr("V1"), v1.clone());
        engine.add_exchange(owner(), addr("V0"), "Venue 0").unwrap();
        engine.add_exchange(owner(), addr("V1"), "Venue 1").unwrap();
        let key = engine
            .add_arbitrage_path(owner(), tokens(&["A", "B", "A"]), vec![0, 1])
            .unwrap();
        let events = engine.subscribe();

        Self {
            engine,
            pool,
            clock,
            v0,
            v1,
            key,
            events,
        }
    }

    /// Runs the round trip with the default amount
    pub fn run(&self) -> Result<U256, crate::errors::EngineError> {
        self.engine.start_arbitrage(owner(), self.key, amount())
    }

    /// Events received since the last drain
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
