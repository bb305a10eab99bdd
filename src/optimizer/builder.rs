//! Dispatch MILP formulation
//!
//! Translates a [`PlantProfile`] and one window of [`MarketPrices`] into a
//! [`MilpModel`] that maximises revenue minus cost over the window.
//!
//! Per period t the model has:
//! - nested commitment binaries `ONF >= RMP >= NRM`
//! - band productions: BSE fixed at MIN when committed, RMP between
//!   `(SEL-MIN)·NRM` and `(SEL-MIN)·RMP`, NRM up to `(MEL-SEL)·NRM`
//! - ramping limits on the RMP and NRM bands between consecutive periods
//! - `UP - DW = Δprod` deviation pairs per band, priced by the ramping costs
//! - fuel, ramping and depreciation cost, revenue and total cost definitions
//!
//! Period 0 has no predecessor. Unless a [`PreviousPeriodState`] is supplied
//! it is exempt from ramping limits and its deviations are pinned to zero.

use std::collections::BTreeMap;

use good_lp::{constraint, variable, Expression, Variable, VariableDefinition};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::milp::MilpModel;
use crate::domain::{
    Band, Column, ColumnKind, DispatchResult, IndexValue, MarketPrices, PlantProfile,
};
use crate::error::{DispatchError, Result};

/// Bands whose period-to-period movement is limited by a ramping rate.
const RATE_LIMITED_BANDS: [Band; 2] = [Band::Rmp, Band::Nrm];

/// Band productions of the period preceding a window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviousPeriodState {
    pub prod_bse: f64,
    pub prod_rmp: f64,
    pub prod_nrm: f64,
}

impl PreviousPeriodState {
    pub fn production(&self, band: Band) -> f64 {
        match band {
            Band::Bse => self.prod_bse,
            Band::Rmp => self.prod_rmp,
            Band::Nrm => self.prod_nrm,
        }
    }

    /// State of the last period of a solved window.
    pub fn from_last_period(result: &DispatchResult) -> Option<Self> {
        let last = result.len().checked_sub(1)?;
        Some(Self {
            prod_bse: result.value(Column::ProdBse, last)?,
            prod_rmp: result.value(Column::ProdRmp, last)?,
            prod_nrm: result.value(Column::ProdNrm, last)?,
        })
    }
}

fn definition(kind: ColumnKind) -> VariableDefinition {
    match kind {
        ColumnKind::Binary => variable().binary(),
        ColumnKind::Free => variable(),
        _ => variable().min(0),
    }
}

/// A built model plus the bookkeeping needed to read its solution back.
#[derive(Debug, Clone)]
pub struct DispatchModel {
    milp: MilpModel,
    plant_id: String,
    keys: Vec<IndexValue>,
    variables: BTreeMap<Column, Vec<Variable>>,
    power_price: Vec<f64>,
    fuel_price: Vec<f64>,
}

impl DispatchModel {
    pub fn milp(&self) -> &MilpModel {
        &self.milp
    }

    pub fn plant_id(&self) -> &str {
        &self.plant_id
    }

    pub fn periods(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[IndexValue] {
        &self.keys
    }

    /// Variable of `column` in `period`; `None` for parameter and derived
    /// columns or a period outside the window.
    pub fn var(&self, column: Column, period: usize) -> Option<Variable> {
        self.variables.get(&column)?.get(period).copied()
    }

    /// Position of a column's variable in solved value vectors.
    pub fn position(&self, column: Column, period: usize) -> Option<usize> {
        self.milp.position(self.var(column, period)?)
    }

    /// Declared decision variables, one vector per column.
    pub fn variables(&self) -> &BTreeMap<Column, Vec<Variable>> {
        &self.variables
    }

    pub fn power_price(&self) -> &[f64] {
        &self.power_price
    }

    pub fn fuel_price(&self) -> &[f64] {
        &self.fuel_price
    }
}

pub struct DispatchModelBuilder<'a> {
    profile: &'a PlantProfile,
    previous: Option<PreviousPeriodState>,
}

impl<'a> DispatchModelBuilder<'a> {
    pub fn new(profile: &'a PlantProfile) -> Self {
        Self {
            profile,
            previous: None,
        }
    }

    /// Link period 0 to the given state instead of treating it as a free start.
    pub fn carry_previous_state(mut self, previous: Option<PreviousPeriodState>) -> Self {
        self.previous = previous;
        self
    }

    pub fn build(&self, prices: &MarketPrices) -> Result<DispatchModel> {
        let wholesale = prices.wholesale();
        let fuel = prices.fuel();
        if wholesale.index() != fuel.index() || wholesale.len() != fuel.len() {
            return Err(DispatchError::ModelBuild(format!(
                "price series are misaligned: {} ({}) vs {} ({})",
                wholesale.index(),
                wholesale.len(),
                fuel.index(),
                fuel.len()
            )));
        }
        if prices.is_empty() {
            return Err(DispatchError::ModelBuild("cannot build a model for an empty window".into()));
        }

        let periods = prices.len();
        let keys = wholesale.keys();
        let plant = self.profile.derived();
        let efficiency = self.profile.efficiency();

        let mut milp = MilpModel::new(format!("dispatch_{}", self.profile.id()));

        let mut variables = BTreeMap::new();
        for column in Column::variables() {
            let declared: Vec<Variable> = (0..periods)
                .map(|t| milp.add_variable(format!("{column}_{t}"), definition(column.kind())))
                .collect();
            variables.insert(column, declared);
        }
        let var = |column: Column, t: usize| variables[&column][t];

        let bse_width = plant.band_width_mw(Band::Bse);
        let rmp_width = plant.band_width_mw(Band::Rmp);
        let nrm_width = plant.band_width_mw(Band::Nrm);

        for t in 0..periods {
            let onf = var(Column::Onf, t);
            let rmp = var(Column::Rmp, t);
            let nrm = var(Column::Nrm, t);
            let prod_bse = var(Column::ProdBse, t);
            let prod_rmp = var(Column::ProdRmp, t);
            let prod_nrm = var(Column::ProdNrm, t);

            // Nested commitment
            milp.add_constraint(format!("status_onf_rmp_{t}"), constraint!(onf >= rmp));
            milp.add_constraint(format!("status_rmp_nrm_{t}"), constraint!(rmp >= nrm));

            // Band productions
            milp.add_constraint(format!("prod_bse_def_{t}"), constraint!(prod_bse == bse_width * onf));
            milp.add_constraint(format!("prod_rmp_lower_{t}"), constraint!(prod_rmp >= rmp_width * nrm));
            milp.add_constraint(format!("prod_rmp_upper_{t}"), constraint!(prod_rmp <= rmp_width * rmp));
            milp.add_constraint(format!("prod_nrm_upper_{t}"), constraint!(prod_nrm <= nrm_width * nrm));

            // Movement against the previous period, or against the carried state
            for band in Band::iter() {
                let prod = var(Column::production(band), t);
                let delta: Option<Expression> = match (t, self.previous) {
                    (0, None) => None,
                    (0, Some(previous)) => Some(prod - previous.production(band)),
                    _ => Some(prod - var(Column::production(band), t - 1)),
                };

                let up = var(Column::ramp_up(band), t);
                let down = var(Column::ramp_down(band), t);
                let Some(delta) = delta else {
                    milp.add_constraint(format!("deviation_{band}_{t}"), constraint!(up + down == 0.0));
                    continue;
                };

                if RATE_LIMITED_BANDS.contains(&band) {
                    let rate = plant.ramping_rate_mw.get(band);
                    let rising = delta.clone();
                    let falling = delta.clone();
                    milp.add_constraint(format!("ramp_up_{band}_{t}"), constraint!(rising <= rate));
                    milp.add_constraint(format!("ramp_down_{band}_{t}"), constraint!(falling >= -rate));
                }
                milp.add_constraint(format!("deviation_{band}_{t}"), constraint!(up - down == delta));
            }

            let production = var(Column::Production, t);
            let consumption = var(Column::Consumption, t);
            let fuel_cost = var(Column::FuelCost, t);
            let ramping_cost = var(Column::RampingCost, t);
            let depreciation_cost = var(Column::DepreciationCost, t);
            let revenue = var(Column::Revenue, t);
            let cost = var(Column::Cost, t);

            let band_total: Expression = Band::iter().map(|band| var(Column::production(band), t)).sum();
            milp.add_constraint(format!("production_def_{t}"), constraint!(production == band_total));
            milp.add_constraint(
                format!("consumption_def_{t}"),
                constraint!(production == efficiency * consumption),
            );

            // Costs and revenue
            let fuel_price = fuel.values()[t];
            let power_price = wholesale.values()[t];
            let moved: Expression = Band::iter()
                .map(|band| {
                    plant.ramping_cost.get(band)
                        * (var(Column::ramp_up(band), t) + var(Column::ramp_down(band), t))
                })
                .sum();
            milp.add_constraint(
                format!("fuel_cost_def_{t}"),
                constraint!(fuel_cost == fuel_price * consumption),
            );
            milp.add_constraint(format!("ramping_cost_def_{t}"), constraint!(ramping_cost == moved));
            milp.add_constraint(
                format!("depreciation_cost_def_{t}"),
                constraint!(depreciation_cost == plant.depreciation_eur * (onf - nrm)),
            );
            milp.add_constraint(
                format!("revenue_def_{t}"),
                constraint!(revenue == power_price * production),
            );
            milp.add_constraint(
                format!("cost_def_{t}"),
                constraint!(cost == fuel_cost + ramping_cost + depreciation_cost),
            );
        }

        milp.set_objective(
            (0..periods)
                .map(|t| var(Column::Revenue, t) - var(Column::Cost, t))
                .sum::<Expression>(),
        );

        tracing::debug!(
            plant = self.profile.id(),
            periods,
            variables = milp.variable_count(),
            binaries = milp.binary_count(),
            constraints = milp.constraints().len(),
            carried_state = self.previous.is_some(),
            "built dispatch model"
        );

        Ok(DispatchModel {
            milp,
            plant_id: self.profile.id().to_string(),
            keys,
            variables,
            power_price: wholesale.values().to_vec(),
            fuel_price: fuel.values().to_vec(),
        })
    }
}
