use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};
use uuid::Uuid;

use super::plant::Band;
use super::time_index::IndexValue;
use crate::error::{DispatchError, Result};

/// Every per-period quantity of the dispatch model, in output order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Column {
    Production,
    Consumption,
    ProdBse,
    ProdRmp,
    ProdNrm,
    Onf,
    Rmp,
    Nrm,
    UpBse,
    DwBse,
    UpRmp,
    DwRmp,
    UpNrm,
    DwNrm,
    FuelCost,
    RampingCost,
    DepreciationCost,
    Revenue,
    Cost,
    PowerPrice,
    FuelPrice,
    Profit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Non-negative continuous decision variable
    NonNegative,
    /// Unbounded continuous decision variable
    Free,
    /// 0/1 commitment variable
    Binary,
    /// Input echoed into the result
    Parameter,
    /// Computed after solving
    Derived,
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Onf | Self::Rmp | Self::Nrm => ColumnKind::Binary,
            Self::Revenue | Self::Cost => ColumnKind::Free,
            Self::PowerPrice | Self::FuelPrice => ColumnKind::Parameter,
            Self::Profit => ColumnKind::Derived,
            _ => ColumnKind::NonNegative,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind(),
            ColumnKind::NonNegative | ColumnKind::Free | ColumnKind::Binary
        )
    }

    /// Columns backed by a decision variable in the model.
    pub fn variables() -> impl Iterator<Item = Column> {
        Self::iter().filter(Column::is_variable)
    }

    pub fn name(&self) -> &'static str {
        (*self).into()
    }

    pub fn production(band: Band) -> Self {
        match band {
            Band::Bse => Self::ProdBse,
            Band::Rmp => Self::ProdRmp,
            Band::Nrm => Self::ProdNrm,
        }
    }

    pub fn ramp_up(band: Band) -> Self {
        match band {
            Band::Bse => Self::UpBse,
            Band::Rmp => Self::UpRmp,
            Band::Nrm => Self::UpNrm,
        }
    }

    pub fn ramp_down(band: Band) -> Self {
        match band {
            Band::Bse => Self::DwBse,
            Band::Rmp => Self::DwRmp,
            Band::Nrm => Self::DwNrm,
        }
    }
}

/// One period of a [`DispatchResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRow {
    pub key: IndexValue,
    #[serde(flatten)]
    pub values: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub periods: usize,
    pub objective: f64,
    pub revenue: f64,
    pub cost: f64,
    pub production_mwh: f64,
    pub committed_periods: usize,
}

/// Solved schedule: one row per period, one column per [`Column`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub plant_id: String,
    keys: Vec<IndexValue>,
    columns: BTreeMap<Column, Vec<f64>>,
}

impl DispatchResult {
    /// Every [`Column`] must be present with one value per key.
    pub fn new(
        plant_id: impl Into<String>,
        keys: Vec<IndexValue>,
        columns: BTreeMap<Column, Vec<f64>>,
    ) -> Result<Self> {
        for column in Column::iter() {
            let values = columns.get(&column).ok_or_else(|| {
                DispatchError::ModelBuild(format!("result is missing column '{column}'"))
            })?;
            if values.len() != keys.len() {
                return Err(DispatchError::ModelBuild(format!(
                    "column '{column}' has {} values for {} periods",
                    values.len(),
                    keys.len()
                )));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            plant_id: plant_id.into(),
            keys,
            columns,
        })
    }

    /// Join window results in order. Keys must keep increasing across parts.
    pub fn concat(parts: Vec<DispatchResult>) -> Result<Self> {
        let mut parts = parts.into_iter();
        let first = parts
            .next()
            .ok_or_else(|| DispatchError::validation("no window results to concatenate"))?;

        let plant_id = first.plant_id;
        let mut keys = first.keys;
        let mut columns = first.columns;

        for part in parts {
            if part.plant_id != plant_id {
                return Err(DispatchError::validation(format!(
                    "cannot concatenate results of plant '{}' onto plant '{plant_id}'",
                    part.plant_id
                )));
            }
            if let (Some(last), Some(next)) = (keys.last(), part.keys.first()) {
                if next <= last {
                    return Err(DispatchError::alignment(format!(
                        "window starting at {next} does not follow {last}"
                    )));
                }
            }
            keys.extend(part.keys);
            for (column, values) in part.columns {
                columns.entry(column).or_default().extend(values);
            }
        }

        Self::new(plant_id, keys, columns)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[IndexValue] {
        &self.keys
    }

    pub fn column(&self, column: Column) -> &[f64] {
        self.columns.get(&column).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn value(&self, column: Column, period: usize) -> Option<f64> {
        self.columns.get(&column)?.get(period).copied()
    }

    /// Sum of revenue minus cost over all periods.
    pub fn objective(&self) -> f64 {
        self.column(Column::Profit).iter().sum()
    }

    pub fn rows(&self) -> Vec<DispatchRow> {
        self.keys
            .iter()
            .enumerate()
            .map(|(period, key)| DispatchRow {
                key: *key,
                values: self
                    .columns
                    .iter()
                    .map(|(column, values)| (column.name(), values[period]))
                    .collect(),
            })
            .collect()
    }

    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            periods: self.len(),
            objective: self.objective(),
            revenue: self.column(Column::Revenue).iter().sum(),
            cost: self.column(Column::Cost).iter().sum(),
            production_mwh: self.column(Column::Production).iter().sum(),
            committed_periods: self
                .column(Column::Onf)
                .iter()
                .filter(|onf| **onf > 0.5)
                .count(),
        }
    }
}
