use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::time_index::{IndexValue, TimeIndex};
use crate::error::{DispatchError, Result};

pub const WHOLESALE_PRICE: &str = "wholesale_price";
pub const CLEAN_FUEL_PRICE: &str = "clean_fuel_price";

/// Named scalar series on a [`TimeIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    name: String,
    unit: String,
    index: TimeIndex,
    values: Vec<f64>,
}

impl PriceSeries {
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        index: TimeIndex,
        values: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(position) = values.iter().position(|v| !v.is_finite()) {
            return Err(DispatchError::validation(format!(
                "series '{name}' has a non-finite value at position {position}"
            )));
        }
        Ok(Self {
            name,
            unit: unit.into(),
            index,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Place the values on `index`, which must generate exactly `length` keys
    /// for this series.
    pub fn align(&self, index: &TimeIndex, length: usize) -> Result<Self> {
        if length != self.values.len() {
            return Err(DispatchError::alignment(format!(
                "series '{}' has {} values but the index {index} was requested with length {length}",
                self.name,
                self.values.len()
            )));
        }
        Ok(Self {
            index: *index,
            ..self.clone()
        })
    }

    /// Sub-series for `range`, keyed by the matching part of the index.
    pub fn window(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.values.len() {
            return Err(DispatchError::validation(format!(
                "window {}..{} is outside series '{}' of length {}",
                range.start,
                range.end,
                self.name,
                self.values.len()
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            unit: self.unit.clone(),
            index: self.index.slice(range.start),
            values: self.values[range].to_vec(),
        })
    }

    pub fn keys(&self) -> Vec<IndexValue> {
        self.index.expand(self.values.len())
    }

    pub fn as_table(&self) -> Vec<(IndexValue, f64)> {
        self.keys().into_iter().zip(self.values.iter().copied()).collect()
    }
}

/// Wholesale power price and clean fuel price on one shared index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPrices {
    wholesale: PriceSeries,
    fuel: PriceSeries,
}

impl MarketPrices {
    pub fn new(wholesale: PriceSeries, fuel: PriceSeries) -> Result<Self> {
        if wholesale.index() != fuel.index() {
            return Err(DispatchError::alignment(format!(
                "series '{}' uses index {} but '{}' uses {}",
                wholesale.name(),
                wholesale.index(),
                fuel.name(),
                fuel.index()
            )));
        }
        if wholesale.len() != fuel.len() {
            return Err(DispatchError::alignment(format!(
                "series '{}' has {} values but '{}' has {}",
                wholesale.name(),
                wholesale.len(),
                fuel.name(),
                fuel.len()
            )));
        }
        Ok(Self { wholesale, fuel })
    }

    /// Build from raw columns. Without explicit keys the index is `0..N-1`.
    pub fn from_columns(
        keys: Option<&[IndexValue]>,
        wholesale: Vec<f64>,
        fuel: Vec<f64>,
    ) -> Result<Self> {
        let index = match keys {
            Some(keys) => {
                if keys.len() != wholesale.len() || keys.len() != fuel.len() {
                    return Err(DispatchError::alignment(format!(
                        "index has {} keys, {WHOLESALE_PRICE} {} values and {CLEAN_FUEL_PRICE} {} values",
                        keys.len(),
                        wholesale.len(),
                        fuel.len()
                    )));
                }
                TimeIndex::infer(keys)?
            }
            None => TimeIndex::integer(0),
        };

        Self::new(
            PriceSeries::new(WHOLESALE_PRICE, "EUR/MWh", index, wholesale)?,
            PriceSeries::new(CLEAN_FUEL_PRICE, "EUR/MWh_th", index, fuel)?,
        )
    }

    pub fn wholesale(&self) -> &PriceSeries {
        &self.wholesale
    }

    pub fn fuel(&self) -> &PriceSeries {
        &self.fuel
    }

    pub fn index(&self) -> &TimeIndex {
        self.wholesale.index()
    }

    pub fn len(&self) -> usize {
        self.wholesale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wholesale.is_empty()
    }

    pub fn window(&self, range: Range<usize>) -> Result<Self> {
        Ok(Self {
            wholesale: self.wholesale.window(range.clone())?,
            fuel: self.fuel.window(range)?,
        })
    }
}
