//! # Simulated collaborators
//!
//! In-memory stand-ins for the flash-loan lender, swap venues and the clock, used for dry
//! runs of the engine, for the `demo` command and in tests. Handles are cheap to clone and
//! share their state, so a caller can keep one and inspect it after handing a clone to
//! the engine.

/// In-memory flash-loan provider
pub mod lender;
/// JSON scenarios driving a full dry run
pub mod scenario;
/// Fixed-rate swap venue and manual clock
pub mod venue;

pub use lender::InMemoryLender;
pub use scenario::{Scenario, ScenarioReport};
pub use venue::{FixedRateVenue, ManualClock};
