use std::collections::BTreeMap;

use serde::Serialize;

use crate::{FinancialRecord, Symbol};

pub const AVERAGE_DAILY_OPEN_PRICE: &str = "average_daily_open_price";
pub const AVERAGE_DAILY_CLOSE_PRICE: &str = "average_daily_close_price";
pub const AVERAGE_DAILY_VOLUME: &str = "average_daily_volume";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RunningSums {
    open_price: f64,
    close_price: f64,
    volume: f64,
    count: u64,
}

/// Running per-symbol means fed one record at a time.
///
/// Memory is bounded by the number of symbols, not the number of records.
#[derive(Debug, Clone, Default)]
pub struct MeanAccumulator {
    sums: BTreeMap<Symbol, RunningSums>,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &FinancialRecord) {
        let sums = self.sums.entry(record.symbol).or_default();
        sums.open_price += record.open_price;
        sums.close_price += record.close_price;
        sums.volume += record.volume as f64;
        sums.count += 1;
    }

    pub fn count(&self, symbol: Symbol) -> u64 {
        self.sums.get(&symbol).map_or(0, |sums| sums.count)
    }

    /// Means for `symbol`, or an empty mapping when nothing was pushed for it.
    pub fn finish(&self, symbol: Symbol) -> Statistics {
        let Some(sums) = self.sums.get(&symbol).filter(|sums| sums.count > 0) else {
            return Statistics::default();
        };
        let count = sums.count as f64;

        let mut values = BTreeMap::new();
        values.insert(AVERAGE_DAILY_OPEN_PRICE, sums.open_price / count);
        values.insert(AVERAGE_DAILY_CLOSE_PRICE, sums.close_price / count);
        values.insert(AVERAGE_DAILY_VOLUME, sums.volume / count);
        Statistics { values }
    }
}

/// Average daily prices and volume, keyed by statistic name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Statistics {
    values: BTreeMap<&'static str, f64>,
}

impl Statistics {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }
}
