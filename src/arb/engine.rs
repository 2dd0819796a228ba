/// Flash-loan arbitrage engine.
///
/// One cycle is `borrow -> swap chain -> repay`, driven by the lender's callback:
///
/// ```text
/// Idle -> LoanRequested -> SwapChainRunning -> Settling -> Succeeded | Reverted
/// ```
///
/// Every custody mutation made after the loan is requested goes through a journal. If any
/// step fails the journal is unwound and the engine is left exactly as it was before
/// `start_arbitrage` was called. Only one cycle can be in flight at a time.
///
/// The engine runs single-threaded. Collaborators call back into it through shared
/// references, so its state lives behind `RefCell`s and no borrow is ever held across a
/// call to the lender or a venue.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, Bytes, I256, U256};
use derive_more::Display;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use super::collaborators::{Clock, Lender, SystemClock, Venue};
use super::custody::Custody;
use super::estimator::{CycleEstimate, ParityQuotes, QuoteSource};
use super::events::{EngineEvent, EventBus};
use super::exchange::{ExchangeDescriptor, ExchangeRegistry};
use super::path::{ArbitragePath, PathRegistry};
use super::types::{Asset, ExchangeIndex, PathKey};
use crate::config::EngineConfig;
use crate::errors::EngineError;

/// Where the in-flight cycle is
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// No cycle in flight
    Idle,
    /// Loan requested, waiting for the lender's callback
    LoanRequested,
    /// Walking the hops
    SwapChainRunning,
    /// Swaps done, debt approved, waiting for the lender to collect
    Settling,
    /// Debt collected, mutations kept
    Succeeded,
    /// Mutations unwound
    Reverted,
}

/// One attempted cycle. Lives only for the duration of `start_arbitrage`.
#[derive(Debug, Clone)]
pub struct LoanCycle {
    /// Path being executed
    pub path_key: PathKey,
    /// Asset borrowed, `tokens[0]` of the path
    pub borrowed_asset: Asset,
    /// Amount borrowed
    pub borrowed_amount: U256,
    /// Premium stated by the lender
    pub premium: U256,
    /// Caller that started the cycle
    pub initiator: Address,
    /// Current phase
    phase: CyclePhase,
    /// Balance of the borrowed asset before the loan
    opening_balance: U256,
    /// Final balance minus debt, set once settled
    profit: Option<U256>,
    /// Amount the lender has collected so far
    repaid: U256,
    /// First failure raised inside a callback
    failure: Option<EngineError>,
    /// Events held back until the cycle succeeds
    pending_events: Vec<EngineEvent>,
}

impl LoanCycle {
    /// Amount owed to the lender
    #[must_use]
    pub fn debt(&self) -> U256 {
        self.borrowed_amount.saturating_add(self.premium)
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> CyclePhase {
        self.phase
    }
}

/// Everything the engine persists
#[derive(Debug, Default)]
struct EngineState {
    /// Registered swap venues
    exchanges: ExchangeRegistry,
    /// Registered routes
    paths: PathRegistry,
    /// Balances and lender allowance
    custody: Custody,
    /// Addresses allowed to start cycles besides the owner
    operators: HashSet<Address>,
}

/// The execution core. See the module docs for the cycle protocol.
pub struct ArbitrageEngine {
    /// Identity of the engine (loan receiver and swap recipient)
    address: Address,
    /// Administrator and withdrawal recipient
    owner: Address,
    /// Tuning knobs
    config: EngineConfig,
    /// Flash-loan provider
    lender: Box<dyn Lender>,
    /// Venue implementations keyed by venue address
    venues: HashMap<Address, Box<dyn Venue>>,
    /// Time source for swap deadlines
    clock: Box<dyn Clock>,
    /// Price discovery for the estimator
    quotes: Box<dyn QuoteSource>,
    /// Registries and custody
    state: RefCell<EngineState>,
    /// In-flight cycle, the re-entrancy guard
    cycle: RefCell<Option<LoanCycle>>,
    /// Event fan-out
    events: EventBus,
}

impl ArbitrageEngine {
    /// Creates an engine with no exchanges, no paths and empty custody.
    ///
    /// Uses the system clock and [`ParityQuotes`] until replaced with
    /// [`with_clock`](Self::with_clock) and [`with_quotes`](Self::with_quotes).
    pub fn new(
        address: Address,
        owner: Address,
        lender: impl Lender + 'static,
        config: EngineConfig,
    ) -> Self {
        Self {
            address,
            owner,
            config,
            lender: Box::new(lender),
            venues: HashMap::new(),
            clock: Box::new(SystemClock),
            quotes: Box::new(ParityQuotes),
            state: RefCell::new(EngineState::default()),
            cycle: RefCell::new(None),
            events: EventBus::default(),
        }
    }

    /// Wires the implementation behind a venue address
    #[must_use]
    pub fn with_venue(mut self, venue: Address, implementation: impl Venue + 'static) -> Self {
        self.venues.insert(venue, Box::new(implementation));
        self
    }

    /// Replaces the clock
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replaces the estimator's quote source
    #[must_use]
    pub fn with_quotes(mut self, quotes: impl QuoteSource + 'static) -> Self {
        self.quotes = Box::new(quotes);
        self
    }

    /// Identity of the engine
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Subscribes to engine events
    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------------
    // Access control
    // ---------------------------------------------------------------------

    /// Fails fast while a cycle is in flight
    fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.cycle.borrow().is_some() {
            return Err(EngineError::CycleAlreadyActive);
        }
        Ok(())
    }

    /// Only the owner
    fn ensure_owner(&self, caller: Address) -> Result<(), EngineError> {
        if caller != self.owner {
            return Err(EngineError::Unauthorized(caller));
        }
        Ok(())
    }

    /// The owner or a registered operator
    fn ensure_operator(&self, caller: Address) -> Result<(), EngineError> {
        if caller == self.owner || self.state.borrow().operators.contains(&caller) {
            return Ok(());
        }
        Err(EngineError::Unauthorized(caller))
    }

    /// Allows `operator` to start cycles.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive` or `Unauthorized` if `caller` is not the owner
    pub fn add_operator(&self, caller: Address, operator: Address) -> Result<(), EngineError> {
        self.set_operator(caller, operator, true)
    }

    /// Revokes `operator`.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive` or `Unauthorized` if `caller` is not the owner
    pub fn remove_operator(&self, caller: Address, operator: Address) -> Result<(), EngineError> {
        self.set_operator(caller, operator, false)
    }

    /// Shared body of `add_operator`/`remove_operator`
    fn set_operator(
        &self,
        caller: Address,
        operator: Address,
        allowed: bool,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.ensure_owner(caller)?;
        {
            let mut state = self.state.borrow_mut();
            if allowed {
                state.operators.insert(operator);
            } else {
                state.operators.remove(&operator);
            }
        }
        self.events
            .publish(EngineEvent::OperatorUpdated { operator, allowed });
        Ok(())
    }

    /// Whether `account` may start cycles
    #[must_use]
    pub fn is_operator(&self, account: Address) -> bool {
        self.ensure_operator(account).is_ok()
    }

    // ---------------------------------------------------------------------
    // Exchange registry
    // ---------------------------------------------------------------------

    /// Appends an active exchange and returns its index.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive` or `Unauthorized`
    pub fn add_exchange(
        &self,
        caller: Address,
        venue: Address,
        name: &str,
    ) -> Result<ExchangeIndex, EngineError> {
        self.ensure_idle()?;
        self.ensure_owner(caller)?;
        let index = self.state.borrow_mut().exchanges.add(venue, name);
        self.events.publish(EngineEvent::ExchangeRegistered {
            index,
            venue,
            name: name.to_string(),
        });
        Ok(index)
    }

    /// Overwrites venue, name and active flag of an exchange.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive`, `Unauthorized` or `InvalidIndex`
    pub fn update_exchange(
        &self,
        caller: Address,
        index: ExchangeIndex,
        venue: Address,
        name: &str,
        active: bool,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.ensure_owner(caller)?;
        self.state
            .borrow_mut()
            .exchanges
            .update(index, venue, name, active)?;
        self.events.publish(EngineEvent::ExchangeUpdated {
            index,
            venue,
            name: name.to_string(),
            active,
        });
        Ok(())
    }

    /// Reads an exchange
    #[must_use]
    pub fn exchange(&self, index: ExchangeIndex) -> Option<ExchangeDescriptor> {
        self.state.borrow().exchanges.get(index).cloned()
    }

    /// Number of registered exchanges
    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.state.borrow().exchanges.len()
    }

    // ---------------------------------------------------------------------
    // Path registry
    // ---------------------------------------------------------------------

    /// Registers (or refreshes) a route and returns its key.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive`, `Unauthorized`, `PathTooShort`, `HopCountMismatch` or
    /// `InvalidExchangeReference`
    pub fn add_arbitrage_path(
        &self,
        caller: Address,
        tokens: Vec<Address>,
        exchange_hops: Vec<ExchangeIndex>,
    ) -> Result<PathKey, EngineError> {
        self.ensure_idle()?;
        self.ensure_owner(caller)?;
        let key = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            let key = state
                .paths
                .add(tokens.clone(), exchange_hops.clone(), &state.exchanges)?;
            if !state.paths.get(&key).is_closed() {
                warn!("Path {key} does not end on the borrowed asset, its cycles cannot repay");
            }
            key
        };
        self.events.publish(EngineEvent::ArbitragePathAdded {
            key,
            tokens,
            exchange_hops,
        });
        Ok(key)
    }

    /// Switches a route on or off.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive`, `Unauthorized` or `PathNotFound`
    pub fn update_arbitrage_path(
        &self,
        caller: Address,
        key: PathKey,
        active: bool,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.ensure_owner(caller)?;
        self.state.borrow_mut().paths.set_active(key, active)?;
        self.events
            .publish(EngineEvent::ArbitragePathUpdated { key, active });
        Ok(())
    }

    /// Reads a route. Returns the zero value (no tokens) when the key is unknown.
    #[must_use]
    pub fn arbitrage_path(&self, key: &PathKey) -> ArbitragePath {
        self.state.borrow().paths.get(key)
    }

    /// Number of distinct routes ever registered
    #[must_use]
    pub fn arbitrage_path_count(&self) -> usize {
        self.state.borrow().paths.len()
    }

    /// Route keys in registration order
    #[must_use]
    pub fn arbitrage_path_keys(&self) -> Vec<PathKey> {
        self.state.borrow().paths.keys().to_vec()
    }

    // ---------------------------------------------------------------------
    // Custody
    // ---------------------------------------------------------------------

    /// Balance of `asset` held by the engine
    #[must_use]
    pub fn balance(&self, asset: &Address) -> U256 {
        self.state.borrow().custody.balance(asset)
    }

    /// Every non-zero balance held by the engine
    #[must_use]
    pub fn balances(&self) -> HashMap<Address, U256> {
        self.state.borrow().custody.balances()
    }

    /// Sweeps the full balance of `asset` to the owner and returns the amount.
    ///
    /// # Errors
    ///
    /// `CycleAlreadyActive`, `Unauthorized` or `NothingToWithdraw`
    pub fn withdraw(&self, caller: Address, asset: Asset) -> Result<U256, EngineError> {
        self.ensure_idle()?;
        self.ensure_owner(caller)?;
        let amount = {
            let mut state = self.state.borrow_mut();
            let amount = state.custody.balance(&asset);
            if amount.is_zero() {
                return Err(EngineError::NothingToWithdraw(asset));
            }
            state.custody.debit(asset, amount)?;
            amount
        };
        info!("Withdrew {amount} of {asset} to owner {}", self.owner);
        self.events
            .publish(EngineEvent::FundsWithdrawn { asset, amount });
        Ok(amount)
    }

    // ---------------------------------------------------------------------
    // Estimation
    // ---------------------------------------------------------------------

    /// Estimates a cycle without borrowing or touching any state.
    ///
    /// # Errors
    ///
    /// `PathNotFound`, `PathInactive` or `QuoteUnavailable`
    pub fn estimate_cycle(&self, key: PathKey, amount: U256) -> Result<CycleEstimate, EngineError> {
        let state = self.state.borrow();
        let path = state.paths.get_executable(&key)?;
        CycleEstimate::new(
            path,
            &state.exchanges,
            self.quotes.as_ref(),
            amount,
            self.config.premium_bps,
        )
    }

    /// Expected profit of a cycle. A go/no-go signal, never a guarantee.
    ///
    /// # Errors
    ///
    /// `PathNotFound`, `PathInactive` or `QuoteUnavailable`
    pub fn simulate_arbitrage(&self, key: PathKey, amount: U256) -> Result<I256, EngineError> {
        self.estimate_cycle(key, amount).map(|estimate| estimate.profit())
    }

    // ---------------------------------------------------------------------
    // Cycle
    // ---------------------------------------------------------------------

    /// Phase of the in-flight cycle, `Idle` if none
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.cycle
            .borrow()
            .as_ref()
            .map_or(CyclePhase::Idle, LoanCycle::phase)
    }

    /// Runs one arbitrage cycle on `key` with a loan of `amount` and returns the profit.
    ///
    /// On any error custody is left exactly as it was before the call.
    ///
    /// # Errors
    ///
    /// * `CycleAlreadyActive` if called while a cycle is in flight
    /// * `Unauthorized` if `caller` is neither owner nor operator
    /// * `ZeroAmount`, `PathNotFound`, `PathInactive`
    /// * any error raised by the lender or during the callback, e.g. `InsufficientProfit`
    pub fn start_arbitrage(
        &self,
        caller: Address,
        key: PathKey,
        amount: U256,
    ) -> Result<U256, EngineError> {
        let asset = self.begin_cycle(caller, key, amount)?;
        debug!("Cycle {key}: requesting loan of {amount} {asset}");

        let params = Bytes::copy_from_slice(key.as_slice());
        let outcome = self
            .lender
            .flash_loan(self, asset, amount, &params)
            .and_then(|()| self.verify_settled());
        self.finish_cycle(outcome)
    }

    /// Checks preconditions, opens the journal and sets the guard
    fn begin_cycle(
        &self,
        caller: Address,
        key: PathKey,
        amount: U256,
    ) -> Result<Asset, EngineError> {
        self.ensure_idle()?;
        self.ensure_operator(caller)?;
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }

        let mut state = self.state.borrow_mut();
        let asset = state
            .paths
            .get_executable(&key)?
            .borrowed_asset()
            .ok_or(EngineError::PathNotFound(key))?;
        let opening_balance = state.custody.balance(&asset);
        state.custody.open_journal();

        *self.cycle.borrow_mut() = Some(LoanCycle {
            path_key: key,
            borrowed_asset: asset,
            borrowed_amount: amount,
            premium: U256::ZERO,
            initiator: caller,
            phase: CyclePhase::LoanRequested,
            opening_balance,
            profit: None,
            repaid: U256::ZERO,
            failure: None,
            pending_events: Vec::new(),
        });
        Ok(asset)
    }

    /// Confirms the lender delivered, the cycle settled and the debt was collected
    fn verify_settled(&self) -> Result<U256, EngineError> {
        let cycle = self.cycle.borrow();
        let cycle = cycle.as_ref().ok_or(EngineError::LoanNotDelivered)?;
        if let Some(failure) = &cycle.failure {
            return Err(failure.clone());
        }
        let profit = match (cycle.phase, cycle.profit) {
            (CyclePhase::Settling, Some(profit)) => profit,
            _ => return Err(EngineError::LoanNotDelivered),
        };
        if cycle.repaid < cycle.debt() {
            return Err(EngineError::RepaymentNotCollected);
        }
        Ok(profit)
    }

    /// Commits or unwinds the cycle and clears the guard
    fn finish_cycle(&self, outcome: Result<U256, EngineError>) -> Result<U256, EngineError> {
        let Some(mut cycle) = self.cycle.borrow_mut().take() else {
            return outcome;
        };
        let key = cycle.path_key;

        match outcome {
            Ok(profit) => {
                self.state.borrow_mut().custody.commit();
                cycle.phase = CyclePhase::Succeeded;
                info!(
                    "Cycle {key}: {} -> profit {profit} {}",
                    cycle.phase, cycle.borrowed_asset
                );
                for event in cycle.pending_events.drain(..) {
                    self.events.publish(event);
                }
                Ok(profit)
            }
            Err(error) => {
                // The callback's own failure wins over whatever the lender made of it
                let error = cycle.failure.take().unwrap_or(error);
                let undone = self.state.borrow_mut().custody.rollback();
                cycle.phase = CyclePhase::Reverted;
                warn!("Cycle {key}: {} ({undone} mutations undone): {error}", cycle.phase);
                Err(error)
            }
        }
    }

    /// Remembers the first failure raised inside a callback so a lender cannot swallow it
    fn poison(&self, error: &EngineError) {
        if let Some(cycle) = self.cycle.borrow_mut().as_mut() {
            cycle.failure.get_or_insert_with(|| error.clone());
        }
    }

    /// Loan callback. Receives the funds, walks the swap chain and approves repayment.
    ///
    /// # Errors
    ///
    /// * `UnauthorizedCallback` if `caller` is not the lender
    /// * `ForeignInitiator` if the loan was not requested by this engine
    /// * `UnexpectedCallback` if it does not match the in-flight loan
    /// * `UnknownVenue`, `SwapFailed`, `DeadlineExceeded` from the swap chain
    /// * `InsufficientProfit` if the final balance cannot cover the debt
    pub fn on_loan_received(
        &self,
        caller: Address,
        asset: Asset,
        amount: U256,
        premium: U256,
        initiator: Address,
        params: &Bytes,
    ) -> Result<(), EngineError> {
        let result = self.receive_loan(caller, asset, amount, premium, initiator, params);
        if let Err(error) = &result {
            self.poison(error);
        }
        result
    }

    /// Body of `on_loan_received`
    fn receive_loan(
        &self,
        caller: Address,
        asset: Asset,
        amount: U256,
        premium: U256,
        initiator: Address,
        params: &Bytes,
    ) -> Result<(), EngineError> {
        if caller != self.lender.address() {
            return Err(EngineError::UnauthorizedCallback(caller));
        }
        if initiator != self.address {
            return Err(EngineError::ForeignInitiator(initiator));
        }

        let key = {
            let mut cycle = self.cycle.borrow_mut();
            let cycle = cycle
                .as_mut()
                .ok_or_else(|| EngineError::UnexpectedCallback("no loan requested".to_string()))?;
            if cycle.phase != CyclePhase::LoanRequested {
                return Err(EngineError::UnexpectedCallback(format!(
                    "cycle is {}",
                    cycle.phase
                )));
            }
            if params.as_ref() != cycle.path_key.as_slice() {
                return Err(EngineError::UnexpectedCallback(
                    "correlation data does not match".to_string(),
                ));
            }
            if asset != cycle.borrowed_asset || amount != cycle.borrowed_amount {
                return Err(EngineError::UnexpectedCallback(format!(
                    "got {amount} {asset}, requested {} {}",
                    cycle.borrowed_amount, cycle.borrowed_asset
                )));
            }
            cycle.premium = premium;
            cycle.phase = CyclePhase::SwapChainRunning;
            cycle.path_key
        };

        self.state.borrow_mut().custody.credit(asset, amount);
        debug!("Cycle {key}: received {amount} {asset}, premium {premium}");

        self.run_swap_chain(key)?;
        self.settle()
    }

    /// Swaps the entire balance of each hop's input token through its venue
    fn run_swap_chain(&self, key: PathKey) -> Result<(), EngineError> {
        let path = self.state.borrow().paths.get(&key);

        for (hop, (token_in, token_out, index)) in path.hops().enumerate() {
            let (venue_address, amount_in) = {
                let mut guard = self.state.borrow_mut();
                let state = &mut *guard;
                let exchange = state.exchanges.get(index).ok_or(EngineError::InvalidIndex {
                    index,
                    count: state.exchanges.len(),
                })?;
                let venue_address = exchange.venue;
                let amount_in = state.custody.balance(&token_in);
                state.custody.debit(token_in, amount_in)?;
                (venue_address, amount_in)
            };
            let venue = self
                .venues
                .get(&venue_address)
                .ok_or(EngineError::UnknownVenue {
                    index,
                    venue: venue_address,
                })?;

            let deadline = self
                .clock
                .now()
                .saturating_add(self.config.swap_deadline_secs);
            // No output floor: slippage is left to route selection
            let amount_out = venue
                .swap(
                    amount_in,
                    U256::ZERO,
                    &[token_in, token_out],
                    self.address,
                    deadline,
                )
                .map_err(|e| EngineError::SwapFailed {
                    venue: venue_address,
                    reason: format!("{e:#}"),
                })?;
            let settled_at = self.clock.now();
            if settled_at > deadline {
                return Err(EngineError::DeadlineExceeded {
                    venue: venue_address,
                    deadline,
                    settled_at,
                });
            }

            self.state.borrow_mut().custody.credit(token_out, amount_out);
            debug!("Cycle {key}: hop {hop} swapped {amount_in} {token_in} for {amount_out} {token_out}");
            self.defer_event(EngineEvent::HopExecuted {
                key,
                hop,
                venue: venue_address,
                token_in,
                token_out,
                amount_in,
                amount_out,
            });
        }
        Ok(())
    }

    /// Checks the final balance against the debt and approves the lender
    fn settle(&self) -> Result<(), EngineError> {
        let mut cycle = self.cycle.borrow_mut();
        let cycle = cycle
            .as_mut()
            .ok_or_else(|| EngineError::UnexpectedCallback("cycle vanished".to_string()))?;
        cycle.phase = CyclePhase::Settling;

        let mut state = self.state.borrow_mut();
        let asset = cycle.borrowed_asset;
        let balance = state.custody.balance(&asset);
        let debt = cycle.debt();
        if balance < debt {
            return Err(EngineError::InsufficientProfit { balance, debt });
        }

        let profit = balance - debt;
        if profit < cycle.opening_balance {
            warn!(
                "Cycle {}: repaid out of prior holdings, {asset} balance drops from {} to {profit}",
                cycle.path_key, cycle.opening_balance
            );
        }
        state.custody.approve(asset, debt);
        cycle.profit = Some(profit);
        cycle.pending_events.push(EngineEvent::ArbitrageExecuted {
            key: cycle.path_key,
            asset,
            profit,
        });
        debug!("Cycle {}: settled, debt {debt} approved", cycle.path_key);
        Ok(())
    }

    /// Holds an event back until the cycle commits
    fn defer_event(&self, event: EngineEvent) {
        if let Some(cycle) = self.cycle.borrow_mut().as_mut() {
            cycle.pending_events.push(event);
        }
    }

    /// Lets the lender pull the approved debt out of custody.
    ///
    /// # Errors
    ///
    /// * `UnauthorizedCallback` if `caller` is not the lender
    /// * `UnexpectedCallback` if no cycle is settling
    /// * `AllowanceExceeded` if more than the approved debt is requested
    pub fn collect_repayment(
        &self,
        caller: Address,
        asset: Asset,
        amount: U256,
    ) -> Result<(), EngineError> {
        let result = self.pay_lender(caller, asset, amount);
        if let Err(error) = &result {
            self.poison(error);
        }
        result
    }

    /// Body of `collect_repayment`
    fn pay_lender(&self, caller: Address, asset: Asset, amount: U256) -> Result<(), EngineError> {
        if caller != self.lender.address() {
            return Err(EngineError::UnauthorizedCallback(caller));
        }
        let mut cycle = self.cycle.borrow_mut();
        let cycle = cycle
            .as_mut()
            .filter(|cycle| cycle.phase == CyclePhase::Settling)
            .ok_or_else(|| EngineError::UnexpectedCallback("no debt to collect".to_string()))?;
        if asset != cycle.borrowed_asset {
            return Err(EngineError::UnexpectedCallback(format!(
                "repayment asked in {asset}, loan was {}",
                cycle.borrowed_asset
            )));
        }
        self.state
            .borrow_mut()
            .custody
            .spend_allowance(asset, amount)?;
        cycle.repaid = cycle.repaid.saturating_add(amount);
        debug!("Cycle {}: lender collected {amount} {asset}", cycle.path_key);
        Ok(())
    }
}
