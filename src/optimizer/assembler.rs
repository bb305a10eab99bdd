use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use super::builder::DispatchModel;
use super::solver::SolverOutcome;
use crate::domain::{Column, ColumnKind, DispatchResult};
use crate::error::{DispatchError, Result};

/// Reads solved values back into a [`DispatchResult`].
///
/// Every declared variable and both price parameters become a column, plus
/// the per-period profit. Binary values are rounded to exactly 0 or 1.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(model: &DispatchModel, outcome: &SolverOutcome) -> Result<DispatchResult> {
        let expected = model.milp().variable_count();
        if outcome.values.len() != expected {
            return Err(DispatchError::ModelBuild(format!(
                "solver returned {} values for {expected} variables",
                outcome.values.len()
            )));
        }

        let periods = model.periods();
        let mut columns = BTreeMap::new();
        for column in Column::iter() {
            let values: Vec<f64> = match column.kind() {
                ColumnKind::Parameter => match column {
                    Column::PowerPrice => model.power_price().to_vec(),
                    _ => model.fuel_price().to_vec(),
                },
                ColumnKind::Derived => continue,
                kind => (0..periods)
                    .map(|t| {
                        let position = model.position(column, t).ok_or_else(|| {
                            DispatchError::ModelBuild(format!("no variable for {column} in period {t}"))
                        })?;
                        let value = outcome.values[position];
                        Ok(if kind == ColumnKind::Binary { value.round() } else { value })
                    })
                    .collect::<Result<_>>()?,
            };
            columns.insert(column, values);
        }

        let profit = columns[&Column::Revenue]
            .iter()
            .zip(&columns[&Column::Cost])
            .map(|(revenue, cost)| revenue - cost)
            .collect();
        columns.insert(Column::Profit, profit);

        DispatchResult::new(model.plant_id(), model.keys().to_vec(), columns)
    }
}
