use std::collections::HashMap;

use alloy::primitives::{Address, I256, U256};

use super::exchange::{ExchangeDescriptor, ExchangeRegistry};
use super::path::ArbitragePath;
use crate::errors::EngineError;

/// Pluggable price discovery used by the estimator.
///
/// Implementations must be read-only. Quotes are only a go/no-go signal; execution
/// never relies on them.
pub trait QuoteSource {
    /// Expected output of swapping `amount_in` of `token_in` for `token_out` on `exchange`,
    /// or `None` if the source cannot price the hop
    fn quote(
        &self,
        exchange: &ExchangeDescriptor,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Option<U256>;
}

/// Placeholder source that knows no prices and assumes every hop trades 1:1.
/// With it the estimate is always minus the premium.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParityQuotes;

impl QuoteSource for ParityQuotes {
    fn quote(&self, _: &ExchangeDescriptor, _: Address, _: Address, amount_in: U256) -> Option<U256> {
        Some(amount_in)
    }
}

/// Snapshot of constant-product pool reserves per venue
#[derive(Debug, Clone, Default)]
pub struct ReserveQuotes {
    /// `(venue, token_in, token_out) -> (reserve_in, reserve_out)`
    reserves: HashMap<(Address, Address, Address), (U256, U256)>,
}

impl ReserveQuotes {
    /// Records a pool on `venue` in both directions
    pub fn insert_pool(
        &mut self,
        venue: Address,
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
    ) {
        self.reserves
            .insert((venue, token0, token1), (reserve0, reserve1));
        self.reserves
            .insert((venue, token1, token0), (reserve1, reserve0));
    }

    /// Uniswap V2 `getAmountOut` with the 0.3% fee
    #[must_use]
    pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
        let amount_in_with_fee = amount_in.saturating_mul(U256::from(997));
        let numerator = amount_in_with_fee.saturating_mul(reserve_out);
        let denominator = reserve_in
            .saturating_mul(U256::from(1000))
            .saturating_add(amount_in_with_fee);
        if denominator.is_zero() {
            return U256::ZERO;
        }
        numerator / denominator
    }
}

impl QuoteSource for ReserveQuotes {
    fn quote(
        &self,
        exchange: &ExchangeDescriptor,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Option<U256> {
        self.reserves
            .get(&(exchange.venue, token_in, token_out))
            .map(|(reserve_in, reserve_out)| Self::amount_out(amount_in, *reserve_in, *reserve_out))
    }
}

/// Expected outcome of a single hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopQuote {
    /// Venue address
    pub venue: Address,
    /// Input token
    pub token_in: Address,
    /// Output token
    pub token_out: Address,
    /// Amount going in
    pub amount_in: U256,
    /// Amount expected out
    pub amount_out: U256,
}

/// Expected outcome of a whole cycle, including the loan premium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEstimate {
    /// Quotes for each hop in order
    hop_quotes: Vec<HopQuote>,
    /// Loan amount
    amount_in: U256,
    /// Premium the lender is expected to charge
    premium: U256,
}

impl CycleEstimate {
    /// Walks the path with `quotes`, feeding each hop's output into the next.
    ///
    /// # Errors
    ///
    /// Returns `QuoteUnavailable` for the first hop the source cannot price, or
    /// `InvalidIndex` if a hop references an unknown exchange
    pub fn new(
        path: &ArbitragePath,
        exchanges: &ExchangeRegistry,
        quotes: &dyn QuoteSource,
        amount_in: U256,
        premium_bps: u32,
    ) -> Result<Self, EngineError> {
        let mut hop_quotes = Vec::with_capacity(path.exchange_hops.len());
        let mut amount = amount_in;
        for (hop, (token_in, token_out, index)) in path.hops().enumerate() {
            // Inactive exchanges are still quoted: existing paths keep trading on them
            let exchange = exchanges.get(index).ok_or(EngineError::InvalidIndex {
                index,
                count: exchanges.len(),
            })?;
            let amount_out = quotes
                .quote(exchange, token_in, token_out, amount)
                .ok_or(EngineError::QuoteUnavailable {
                    hop,
                    token_in,
                    token_out,
                })?;
            hop_quotes.push(HopQuote {
                venue: exchange.venue,
                token_in,
                token_out,
                amount_in: amount,
                amount_out,
            });
            amount = amount_out;
        }

        Ok(Self {
            hop_quotes,
            amount_in,
            premium: amount_in.saturating_mul(U256::from(premium_bps)) / U256::from(10_000),
        })
    }

    /// Quotes for each hop
    #[must_use]
    pub fn hop_quotes(&self) -> &[HopQuote] {
        &self.hop_quotes
    }

    /// Loan amount fed into the first hop
    #[must_use]
    pub const fn amount_in(&self) -> U256 {
        self.amount_in
    }

    /// Expected output of the last hop
    #[must_use]
    pub fn amount_out(&self) -> U256 {
        self.hop_quotes
            .last()
            .map_or(self.amount_in, |quote| quote.amount_out)
    }

    /// Expected premium
    #[must_use]
    pub const fn premium(&self) -> U256 {
        self.premium
    }

    /// Expected profit after repaying loan and premium. Negative when the cycle loses.
    #[must_use]
    pub fn profit(&self) -> I256 {
        I256::from_raw(self.amount_out())
            .saturating_sub(I256::from_raw(self.amount_in))
            .saturating_sub(I256::from_raw(self.premium))
    }

    /// Profit margin in basis points (10,000 = 100%), saturating at `i32::MAX`
    #[must_use]
    pub fn profit_margin(&self) -> i32 {
        if self.amount_in.is_zero() {
            return 0;
        }
        let profit = self.profit();
        let margin = profit.unsigned_abs().saturating_mul(U256::from(10_000)) / self.amount_in;
        let result = u64::try_from(margin)
            .ok()
            .and_then(|margin| i32::try_from(margin).ok())
            .unwrap_or(i32::MAX);
        if profit.is_negative() {
            -result
        } else {
            result
        }
    }

    /// Whether the estimate is a go signal
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.profit().is_positive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    fn two_venues() -> ExchangeRegistry {
        let mut exchanges = ExchangeRegistry::default();
        exchanges.add(addr("V0"), "Venue 0");
        exchanges.add(addr("V1"), "Venue 1");
        exchanges
    }

    fn round_trip() -> ArbitragePath {
        ArbitragePath {
            tokens: tokens(&["A", "B", "A"]),
            exchange_hops: vec![0, 1],
            active: true,
        }
    }

    #[test]
    fn test_amount_out() {
        for (amount_in, reserve_in, reserve_out, expected) in &[
            // in, reserve in, reserve out, out
            (10, 100, 200, 18),
            (18, 300, 300, 16),
            (0, 100, 200, 0),
            (10, 0, 0, 0),
        ] {
            assert_eq!(
                ReserveQuotes::amount_out(
                    U256::from(*amount_in),
                    U256::from(*reserve_in),
                    U256::from(*reserve_out)
                ),
                U256::from(*expected)
            );
        }
    }

    #[test]
    fn test_parity_estimate_is_minus_premium() {
        let estimate =
            CycleEstimate::new(&round_trip(), &two_venues(), &ParityQuotes, U256::from(10_000), 9)
                .unwrap();
        assert_eq!(estimate.amount_out(), U256::from(10_000));
        assert_eq!(estimate.premium(), U256::from(9));
        assert_eq!(estimate.profit(), I256::try_from(-9_i64).unwrap());
        assert!(!estimate.is_profitable());
        assert_eq!(estimate.profit_margin(), -9);
    }

    #[test]
    fn test_reserve_estimate() {
        let mut quotes = ReserveQuotes::default();
        quotes.insert_pool(addr("V0"), addr("A"), addr("B"), U256::from(100), U256::from(200));
        quotes.insert_pool(addr("V1"), addr("A"), addr("B"), U256::from(300), U256::from(300));

        let estimate =
            CycleEstimate::new(&round_trip(), &two_venues(), &quotes, U256::from(10), 0).unwrap();
        assert_eq!(estimate.hop_quotes().len(), 2);
        assert_eq!(estimate.hop_quotes()[0].amount_out, U256::from(18));
        assert_eq!(estimate.hop_quotes()[1].amount_in, U256::from(18));
        assert_eq!(estimate.amount_out(), U256::from(16));
        assert_eq!(estimate.profit(), I256::try_from(6_i64).unwrap());
        assert_eq!(estimate.profit_margin(), 6_000);
        assert!(estimate.is_profitable());
    }

    #[test]
    fn test_missing_quote() {
        let mut quotes = ReserveQuotes::default();
        quotes.insert_pool(addr("V0"), addr("A"), addr("B"), U256::from(100), U256::from(200));

        assert_eq!(
            CycleEstimate::new(&round_trip(), &two_venues(), &quotes, U256::from(10), 0)
                .err()
                .unwrap(),
            EngineError::QuoteUnavailable {
                hop: 1,
                token_in: addr("B"),
                token_out: addr("A"),
            }
        );
    }

    /// Quotes every hop at the same fixed output
    struct FixedQuotes(U256);

    impl QuoteSource for FixedQuotes {
        fn quote(&self, _: &ExchangeDescriptor, _: Address, _: Address, _: U256) -> Option<U256> {
            Some(self.0)
        }
    }

    #[test]
    fn test_profit_margin_saturates() {
        let quotes = FixedQuotes(U256::from(10).pow(U256::from(30)));
        let gain =
            CycleEstimate::new(&round_trip(), &two_venues(), &quotes, U256::from(1), 0).unwrap();
        assert!(gain.is_profitable());
        assert_eq!(gain.profit_margin(), i32::MAX);

        let loss = CycleEstimate::new(
            &round_trip(),
            &two_venues(),
            &FixedQuotes(U256::ZERO),
            U256::from(1000),
            0,
        )
        .unwrap();
        assert_eq!(loss.profit_margin(), -10_000);
    }
}
