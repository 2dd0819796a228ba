/// Notifications published by the engine for external observers (dashboards, monitors).
/// Nothing inside the engine depends on them.
use std::cell::RefCell;

use alloy::primitives::{Address, I256, U256};
use derive_more::Display;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::types::{ExchangeIndex, PathKey};

/// Something observable happened in the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
#[serde(tag = "event")]
pub enum EngineEvent {
    /// A new exchange was appended
    #[display("ExchangeRegistered(#{index} {name} @ {venue})")]
    ExchangeRegistered {
        /// Assigned index
        index: ExchangeIndex,
        /// Venue address
        venue: Address,
        /// Display name
        name: String,
    },
    /// An exchange was overwritten
    #[display("ExchangeUpdated(#{index} {name} @ {venue}, active={active})")]
    ExchangeUpdated {
        /// Exchange index
        index: ExchangeIndex,
        /// Venue address
        venue: Address,
        /// Display name
        name: String,
        /// Active flag
        active: bool,
    },
    /// A path was registered or refreshed
    #[display("ArbitragePathAdded({key}, {} tokens)", tokens.len())]
    ArbitragePathAdded {
        /// Path key
        key: PathKey,
        /// Token sequence
        tokens: Vec<Address>,
        /// Exchange per hop
        exchange_hops: Vec<ExchangeIndex>,
    },
    /// A path was switched on or off
    #[display("ArbitragePathUpdated({key}, active={active})")]
    ArbitragePathUpdated {
        /// Path key
        key: PathKey,
        /// Active flag
        active: bool,
    },
    /// One hop of a successful cycle
    #[display("HopExecuted({key} #{hop}: {amount_in} {token_in} -> {amount_out} {token_out})")]
    HopExecuted {
        /// Path key
        key: PathKey,
        /// Hop position
        hop: usize,
        /// Venue address
        venue: Address,
        /// Input token
        token_in: Address,
        /// Output token
        token_out: Address,
        /// Amount sent to the venue
        amount_in: U256,
        /// Amount received from the venue
        amount_out: U256,
    },
    /// A cycle repaid its loan and kept `profit`
    #[display("ArbitrageExecuted({key}, profit={profit})")]
    ArbitrageExecuted {
        /// Path key
        key: PathKey,
        /// Borrowed asset
        asset: Address,
        /// Realized profit in the borrowed asset
        profit: U256,
    },
    /// The owner swept a balance
    #[display("FundsWithdrawn({asset}, {amount})")]
    FundsWithdrawn {
        /// Asset address
        asset: Address,
        /// Amount transferred to the owner
        amount: U256,
    },
    /// An operator was granted or revoked
    #[display("OperatorUpdated({operator}, allowed={allowed})")]
    OperatorUpdated {
        /// Operator address
        operator: Address,
        /// Whether the operator may start cycles
        allowed: bool,
    },
}

impl EngineEvent {
    /// Profit of an executed cycle as a signed value, if this is one. Saturates at `I256::MAX`.
    #[must_use]
    pub fn profit(&self) -> Option<I256> {
        match self {
            Self::ArbitrageExecuted { profit, .. } => {
                Some(I256::try_from(*profit).unwrap_or(I256::MAX))
            }
            _ => None,
        }
    }
}

/// Fan-out of events to any number of subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    /// Live subscriber channels
    subscribers: RefCell<Vec<UnboundedSender<EngineEvent>>>,
}

impl EventBus {
    /// Adds a subscriber and returns its receiving end
    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.borrow_mut().push(tx);
        rx
    }

    /// Logs the event and sends it to every subscriber, dropping closed ones
    pub fn publish(&self, event: EngineEvent) {
        log::info!("event: {event}");
        self.subscribers
            .borrow_mut()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}
