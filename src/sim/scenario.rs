use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use alloy::primitives::{Address, I256, U256};
use eyre::{eyre, Result, WrapErr};
use log::{info, warn};
use serde::Deserialize;

use super::lender::InMemoryLender;
use super::venue::{FixedRateVenue, ManualClock};
use crate::arb::engine::ArbitrageEngine;
use crate::arb::estimator::{ParityQuotes, ReserveQuotes};
use crate::arb::types::{ExchangeIndex, PathKey, Timestamp};
use crate::config::EngineConfig;
use crate::errors::EngineError;

/// Scenario shipped with the binary
const BUILTIN: &str = include_str!("../../demos/scenario.json");

/// Lender settings
#[derive(Debug, Clone, Deserialize)]
pub struct LenderSpec {
    /// Lender identity
    pub address: Address,
    /// Premium in basis points
    pub premium_bps: u32,
    /// Liquidity per token symbol
    #[serde(default)]
    pub liquidity: BTreeMap<String, u128>,
}

/// A fixed rate on a venue
#[derive(Debug, Clone, Deserialize)]
pub struct RateSpec {
    /// Input token symbol
    pub from: String,
    /// Output token symbol
    pub to: String,
    /// Output per input, in basis points
    pub rate_bps: u32,
}

/// An exchange and the simulated venue behind it
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSpec {
    /// Display name
    pub name: String,
    /// Venue address
    pub venue: Address,
    /// Seconds each swap takes
    #[serde(default)]
    pub latency_secs: u64,
    /// Set to `false` to deactivate the exchange once paths are registered
    #[serde(default = "default_true")]
    pub active: bool,
    /// Pair rates
    #[serde(default)]
    pub rates: Vec<RateSpec>,
}

/// Pool reserves known to the estimator
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveSpec {
    /// Exchange index
    pub exchange: ExchangeIndex,
    /// First token symbol
    pub token0: String,
    /// Second token symbol
    pub token1: String,
    /// Reserve of `token0`
    pub reserve0: u128,
    /// Reserve of `token1`
    pub reserve1: u128,
}

/// A route by token symbols
#[derive(Debug, Clone, Deserialize)]
pub struct PathSpec {
    /// Token symbols in order
    pub tokens: Vec<String>,
    /// Exchange index per hop
    pub hops: Vec<ExchangeIndex>,
}

/// One execution attempt
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptSpec {
    /// Index into `paths`
    pub path: usize,
    /// Loan amount
    pub amount: u128,
    /// Execute even if the estimate says no
    #[serde(default)]
    pub force: bool,
}

/// Serde default for `active`
const fn default_true() -> bool {
    true
}

/// A complete dry run: collaborators, registrations and attempts
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Engine identity
    pub engine: Address,
    /// Engine owner
    pub owner: Address,
    /// Operator that starts the cycles, the owner if absent
    #[serde(default)]
    pub operator: Option<Address>,
    /// Token symbols to addresses
    pub tokens: BTreeMap<String, Address>,
    /// Lender settings
    pub lender: LenderSpec,
    /// Exchanges in registration order
    pub exchanges: Vec<ExchangeSpec>,
    /// Reserves for the estimator; the estimator falls back to parity quotes if empty
    #[serde(default)]
    pub reserves: Vec<ReserveSpec>,
    /// Routes in registration order
    pub paths: Vec<PathSpec>,
    /// Attempts in execution order
    pub attempts: Vec<AttemptSpec>,
    /// Token symbols swept to the owner at the end
    #[serde(default)]
    pub withdraw: Vec<String>,
}

/// What happened to an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The cycle succeeded with this profit
    Executed(U256),
    /// The cycle reverted
    Failed(EngineError),
    /// The estimate was not a go signal
    Skipped,
}

/// Report of one attempt
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// Path key
    pub key: PathKey,
    /// Loan amount
    pub amount: U256,
    /// Estimated profit, or why there is none
    pub estimate: Result<I256, EngineError>,
    /// Execution outcome
    pub outcome: Outcome,
}

/// Result of a scenario run
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    /// One entry per attempt
    pub attempts: Vec<AttemptReport>,
    /// Amounts swept to the owner
    pub withdrawals: Vec<(Address, U256)>,
}

impl ScenarioReport {
    /// Number of attempts that executed
    #[must_use]
    pub fn executed(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| matches!(attempt.outcome, Outcome::Executed(_)))
            .count()
    }

    /// Sum of all realized profits
    #[must_use]
    pub fn total_profit(&self) -> U256 {
        self.attempts
            .iter()
            .filter_map(|attempt| match attempt.outcome {
                Outcome::Executed(profit) => Some(profit),
                _ => None,
            })
            .fold(U256::ZERO, U256::saturating_add)
    }
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.attempts.iter().enumerate() {
            let estimate = attempt
                .estimate
                .as_ref()
                .map_or_else(|e| format!("n/a ({e})"), ToString::to_string);
            let outcome = match &attempt.outcome {
                Outcome::Executed(profit) => format!("executed, profit {profit}"),
                Outcome::Failed(error) => format!("reverted: {error}"),
                Outcome::Skipped => "skipped".to_string(),
            };
            writeln!(
                f,
                "#{i} {} amount={} estimate={estimate} -> {outcome}",
                attempt.key, attempt.amount
            )?;
        }
        for (asset, amount) in &self.withdrawals {
            writeln!(f, "withdrew {amount} of {asset}")?;
        }
        write!(
            f,
            "{}/{} cycles executed, total profit {}",
            self.executed(),
            self.attempts.len(),
            self.total_profit()
        )
    }
}

impl Scenario {
    /// The scenario shipped with the binary.
    ///
    /// # Errors
    /// * If the embedded JSON is invalid
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN)
    }

    /// Parses a scenario from JSON.
    ///
    /// # Errors
    /// * If the JSON does not describe a scenario
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).wrap_err("invalid scenario")
    }

    /// Reads a scenario from a JSON file.
    ///
    /// # Errors
    /// * If the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?;
        Self::parse(&json)
    }

    /// Resolves a token symbol.
    ///
    /// # Errors
    /// * If the symbol is not declared in `tokens`
    pub fn token(&self, symbol: &str) -> Result<Address> {
        self.tokens
            .get(symbol)
            .copied()
            .ok_or_else(|| eyre!("unknown token symbol {symbol}"))
    }

    /// Wires an engine to simulated collaborators. Nothing is registered yet.
    ///
    /// # Errors
    /// * If a token symbol is unknown
    pub fn build(&self, config: EngineConfig, start: Timestamp) -> Result<(ArbitrageEngine, ManualClock)> {
        let clock = ManualClock::new(start);

        let mut lender = InMemoryLender::new(self.lender.address, self.lender.premium_bps);
        for (symbol, amount) in &self.lender.liquidity {
            lender = lender.with_liquidity(self.token(symbol)?, U256::from(*amount));
        }

        let mut engine =
            ArbitrageEngine::new(self.engine, self.owner, lender, config).with_clock(clock.clone());

        for exchange in &self.exchanges {
            let venue = FixedRateVenue::new().with_clock(clock.clone(), exchange.latency_secs);
            for rate in &exchange.rates {
                venue.set_rate(self.token(&rate.from)?, self.token(&rate.to)?, rate.rate_bps);
            }
            engine = engine.with_venue(exchange.venue, venue);
        }

        if self.reserves.is_empty() {
            engine = engine.with_quotes(ParityQuotes);
        } else {
            let mut quotes = ReserveQuotes::default();
            for reserve in &self.reserves {
                let exchange = self
                    .exchanges
                    .get(reserve.exchange)
                    .ok_or_else(|| eyre!("reserves reference unknown exchange {}", reserve.exchange))?;
                quotes.insert_pool(
                    exchange.venue,
                    self.token(&reserve.token0)?,
                    self.token(&reserve.token1)?,
                    U256::from(reserve.reserve0),
                    U256::from(reserve.reserve1),
                );
            }
            engine = engine.with_quotes(quotes);
        }

        Ok((engine, clock))
    }

    /// Registers everything on `engine`, runs the attempts and sweeps profits.
    ///
    /// Cycle failures are part of the report, not errors.
    ///
    /// # Errors
    /// * If a registration is rejected or a reference is unknown
    pub fn run(&self, engine: &ArbitrageEngine) -> Result<ScenarioReport> {
        for exchange in &self.exchanges {
            engine.add_exchange(self.owner, exchange.venue, &exchange.name)?;
        }

        let mut keys = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let tokens = path
                .tokens
                .iter()
                .map(|symbol| self.token(symbol))
                .collect::<Result<Vec<_>>>()?;
            keys.push(engine.add_arbitrage_path(self.owner, tokens, path.hops.clone())?);
        }

        // Deactivation only blocks new paths, the ones above keep their hops
        for (index, exchange) in self.exchanges.iter().enumerate() {
            if !exchange.active {
                engine.update_exchange(self.owner, index, exchange.venue, &exchange.name, false)?;
            }
        }

        let caller = match self.operator {
            Some(operator) => {
                engine.add_operator(self.owner, operator)?;
                operator
            }
            None => self.owner,
        };

        let mut report = ScenarioReport::default();
        for attempt in &self.attempts {
            let key = *keys
                .get(attempt.path)
                .ok_or_else(|| eyre!("attempt references unknown path {}", attempt.path))?;
            let amount = U256::from(attempt.amount);
            let estimate = engine.simulate_arbitrage(key, amount);
            let go = estimate.as_ref().is_ok_and(|profit| profit.is_positive());

            let outcome = if go || attempt.force {
                match engine.start_arbitrage(caller, key, amount) {
                    Ok(profit) => Outcome::Executed(profit),
                    Err(error) => {
                        warn!("scenario: attempt on {key} reverted: {error}");
                        Outcome::Failed(error)
                    }
                }
            } else {
                info!("scenario: skipping {key}, estimate is not a go");
                Outcome::Skipped
            };
            report.attempts.push(AttemptReport {
                key,
                amount,
                estimate,
                outcome,
            });
        }

        for symbol in &self.withdraw {
            let asset = self.token(symbol)?;
            match engine.withdraw(self.owner, asset) {
                Ok(amount) => report.withdrawals.push((asset, amount)),
                Err(EngineError::NothingToWithdraw(_)) => {
                    info!("scenario: nothing to withdraw for {symbol}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(report)
    }
}
