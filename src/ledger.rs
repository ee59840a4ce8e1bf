// src/ledger.rs
use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

/// A user's position in one symbol: share count plus the weighted-average
/// cost basis across every buy of that symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub shares: u32,
    pub average_cost: f64,
}

/// Sell rejected because the user holds fewer shares than requested.
/// A business condition, not a fault; the trade handler maps it to a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient shares")]
pub struct InsufficientShares;

/// In-memory store of every user's holdings.
///
/// Holdings for a user keep the order of first purchase. A holding is pruned
/// the moment its share count reaches zero, so anything present in the map
/// has `shares >= 1`. Symbols are matched exactly; callers normalize to
/// uppercase before touching the ledger.
///
/// The ledger itself is synchronous and lock-free. The HTTP layer holds it
/// behind an `RwLock` so concurrent trades for the same user cannot
/// interleave their read-check-write steps.
#[derive(Debug, Default)]
pub struct Ledger {
    portfolios: HashMap<String, Vec<Holding>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All holdings for a user, oldest first. Unknown users hold nothing.
    pub fn portfolio(&self, user_id: &str) -> &[Holding] {
        self.portfolios
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Point lookup by exact symbol.
    pub fn holding(&self, user_id: &str, symbol: &str) -> Option<&Holding> {
        self.portfolios
            .get(user_id)?
            .iter()
            .find(|holding| holding.symbol == symbol)
    }

    /// Record a buy, folding the trade into the weighted-average cost basis.
    ///
    /// Quantity/price validation and the funds check are the caller's job;
    /// this only does the bookkeeping.
    pub fn buy(&mut self, user_id: &str, symbol: &str, shares: u32, price: f64) {
        let portfolio = self.portfolios.entry(user_id.to_string()).or_default();
        match portfolio.iter_mut().find(|holding| holding.symbol == symbol) {
            Some(existing) => {
                let total_cost = existing.average_cost * f64::from(existing.shares)
                    + price * f64::from(shares);
                existing.shares += shares;
                existing.average_cost = total_cost / f64::from(existing.shares);
            }
            None => portfolio.push(Holding {
                symbol: symbol.to_string(),
                shares,
                average_cost: price,
            }),
        }
    }

    /// Record a sell. Fails without mutating anything when the user holds
    /// fewer than `shares` of the symbol (or none at all). Selling a holding
    /// down to exactly zero removes it; the average cost of any remaining
    /// shares is untouched.
    pub fn sell(
        &mut self,
        user_id: &str,
        symbol: &str,
        shares: u32,
    ) -> Result<(), InsufficientShares> {
        let portfolio = self
            .portfolios
            .get_mut(user_id)
            .ok_or(InsufficientShares)?;
        let index = portfolio
            .iter()
            .position(|holding| holding.symbol == symbol)
            .ok_or(InsufficientShares)?;
        if portfolio[index].shares < shares {
            return Err(InsufficientShares);
        }
        portfolio[index].shares -= shares;
        if portfolio[index].shares == 0 {
            portfolio.remove(index);
        }
        Ok(())
    }
}
