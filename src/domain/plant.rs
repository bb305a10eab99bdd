use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use validator::Validate;

use crate::error::{DispatchError, Result};

/// Production tier of a thermal unit.
///
/// BSE is the base block between zero and MIN, RMP the ramping block between
/// MIN and SEL, NRM the near-rated block between SEL and MEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Band {
    Bse,
    Rmp,
    Nrm,
}

/// One value per [`Band`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandValues<T> {
    pub bse: T,
    pub rmp: T,
    pub nrm: T,
}

impl<T: Copy> BandValues<T> {
    pub fn new(bse: T, rmp: T, nrm: T) -> Self {
        Self { bse, rmp, nrm }
    }

    pub fn get(&self, band: Band) -> T {
        match band {
            Band::Bse => self.bse,
            Band::Rmp => self.rmp,
            Band::Nrm => self.nrm,
        }
    }

    /// Pure transform into a new set of values; `self` is left untouched.
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> BandValues<U> {
        BandValues {
            bse: f(self.bse),
            rmp: f(self.rmp),
            nrm: f(self.nrm),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, T)> + '_ {
        Band::iter().map(move |band| (band, self.get(band)))
    }
}

/// Flat plant configuration as provided by a human or the storage layer.
///
/// Fractions are relative to installed capacity, costs per MW installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PlantConfig {
    #[validate(length(min = 1))]
    pub id: String,

    /// Installed capacity (MW)
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_mw: f64,

    /// Electrical efficiency (0-1]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub efficiency: f64,

    /// Minimal production fraction
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_fraction: f64,

    /// Stable export limit fraction
    #[validate(range(min = 0.0, max = 1.0))]
    pub sel_fraction: f64,

    /// Maximal export limit fraction
    #[validate(range(min = 0.0, max = 1.0))]
    pub mel_fraction: f64,

    /// Ramping rates as fraction of capacity per period
    #[validate(range(min = 0.0, max = 1.0))]
    pub ramping_rate_bse: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub ramping_rate_rmp: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub ramping_rate_nrm: f64,

    /// Ramping costs (EUR/MW moved)
    #[validate(range(min = 0.0))]
    pub ramping_cost_bse: f64,
    #[validate(range(min = 0.0))]
    pub ramping_cost_rmp: f64,
    #[validate(range(min = 0.0))]
    pub ramping_cost_nrm: f64,

    /// Wear cost (EUR/MW installed per period) while committed below the NRM tier
    #[validate(range(min = 0.0))]
    pub depreciation: f64,

    #[validate(range(min = 0.0))]
    pub shutdown_cost: f64,
    #[validate(range(min = 0.0))]
    pub hot_start_cost: f64,
    #[validate(range(min = 0.0))]
    pub warm_start_cost: f64,
    #[validate(range(min = 0.0))]
    pub cold_start_cost: f64,

    /// A start within this many hours of shutdown counts as hot
    #[validate(range(min = 0.0))]
    pub hot_start_within_hours: f64,

    /// A start within this many hours of shutdown counts as warm
    #[validate(range(min = 0.0))]
    pub warm_start_within_hours: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            id: "reference-plant".to_string(),
            capacity_mw: 100.0,
            efficiency: 0.5,
            min_fraction: 0.2,
            sel_fraction: 0.8,
            mel_fraction: 1.0,
            ramping_rate_bse: 0.0,
            ramping_rate_rmp: 0.025,
            ramping_rate_nrm: 0.1,
            ramping_cost_bse: 30.0,
            ramping_cost_rmp: 25.0,
            ramping_cost_nrm: 20.0,
            depreciation: 2.0,
            shutdown_cost: 0.0,
            hot_start_cost: 20.0,
            warm_start_cost: 21.0,
            cold_start_cost: 22.0,
            hot_start_within_hours: 3.0,
            warm_start_within_hours: 12.0,
        }
    }
}

impl PlantConfig {
    fn numeric_fields(&self) -> [(&'static str, f64); 18] {
        [
            ("capacity_mw", self.capacity_mw),
            ("efficiency", self.efficiency),
            ("min_fraction", self.min_fraction),
            ("sel_fraction", self.sel_fraction),
            ("mel_fraction", self.mel_fraction),
            ("ramping_rate_bse", self.ramping_rate_bse),
            ("ramping_rate_rmp", self.ramping_rate_rmp),
            ("ramping_rate_nrm", self.ramping_rate_nrm),
            ("ramping_cost_bse", self.ramping_cost_bse),
            ("ramping_cost_rmp", self.ramping_cost_rmp),
            ("ramping_cost_nrm", self.ramping_cost_nrm),
            ("depreciation", self.depreciation),
            ("shutdown_cost", self.shutdown_cost),
            ("hot_start_cost", self.hot_start_cost),
            ("warm_start_cost", self.warm_start_cost),
            ("cold_start_cost", self.cold_start_cost),
            ("hot_start_within_hours", self.hot_start_within_hours),
            ("warm_start_within_hours", self.warm_start_within_hours),
        ]
    }

    /// Validate ranges, finiteness and the MIN <= SEL <= MEL ordering.
    pub fn check(&self) -> Result<()> {
        for (name, value) in self.numeric_fields() {
            if !value.is_finite() {
                return Err(DispatchError::validation(format!(
                    "{name} is not finite: {value}"
                )));
            }
        }

        self.validate()?;

        if self.min_fraction > self.sel_fraction || self.sel_fraction > self.mel_fraction {
            return Err(DispatchError::validation(format!(
                "production fractions must satisfy MIN <= SEL <= MEL, got {} / {} / {}",
                self.min_fraction, self.sel_fraction, self.mel_fraction
            )));
        }

        Ok(())
    }

    pub fn ramping_rates(&self) -> BandValues<f64> {
        BandValues::new(self.ramping_rate_bse, self.ramping_rate_rmp, self.ramping_rate_nrm)
    }

    pub fn ramping_costs(&self) -> BandValues<f64> {
        BandValues::new(self.ramping_cost_bse, self.ramping_cost_rmp, self.ramping_cost_nrm)
    }
}

/// Absolute (MW, EUR) quantities computed from a [`PlantConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedQuantities {
    /// Ramping rate per band (MW per period)
    pub ramping_rate_mw: BandValues<f64>,
    /// Ramping cost per band (EUR per MW moved)
    pub ramping_cost: BandValues<f64>,
    /// Fuel consumption at rated output (MW thermal)
    pub rated_consumption_mw: f64,
    /// Depreciation (EUR per period)
    pub depreciation_eur: f64,
    pub min_mw: f64,
    pub sel_mw: f64,
    pub mel_mw: f64,
    pub shutdown_cost_eur: f64,
    pub hot_start_cost_eur: f64,
    pub warm_start_cost_eur: f64,
    pub cold_start_cost_eur: f64,
}

impl DerivedQuantities {
    pub fn derive(config: &PlantConfig) -> Self {
        let capacity = config.capacity_mw;
        Self {
            ramping_rate_mw: config.ramping_rates().map(|fraction| fraction * capacity),
            ramping_cost: config.ramping_costs(),
            rated_consumption_mw: capacity / config.efficiency,
            depreciation_eur: config.depreciation * capacity,
            min_mw: config.min_fraction * capacity,
            sel_mw: config.sel_fraction * capacity,
            mel_mw: config.mel_fraction * capacity,
            shutdown_cost_eur: config.shutdown_cost * capacity,
            hot_start_cost_eur: config.hot_start_cost * capacity,
            warm_start_cost_eur: config.warm_start_cost * capacity,
            cold_start_cost_eur: config.cold_start_cost * capacity,
        }
    }

    /// Width of a production band in MW.
    pub fn band_width_mw(&self, band: Band) -> f64 {
        match band {
            Band::Bse => self.min_mw,
            Band::Rmp => self.sel_mw - self.min_mw,
            Band::Nrm => self.mel_mw - self.sel_mw,
        }
    }
}

/// Start classification by time offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StartKind {
    Hot,
    Warm,
    Cold,
}

/// Validated, immutable plant description.
///
/// Derived quantities are computed once in [`PlantProfile::new`]; any change
/// goes through [`PlantProfile::update`], which re-derives them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantProfile {
    config: PlantConfig,
    derived: DerivedQuantities,
}

impl PlantProfile {
    pub fn new(config: PlantConfig) -> Result<Self> {
        config.check()?;
        let derived = DerivedQuantities::derive(&config);
        Ok(Self { config, derived })
    }

    /// Returns a new profile with `change` applied to a copy of the config.
    pub fn update(&self, change: impl FnOnce(&mut PlantConfig)) -> Result<Self> {
        let mut config = self.config.clone();
        change(&mut config);
        Self::new(config)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &PlantConfig {
        &self.config
    }

    pub fn derived(&self) -> &DerivedQuantities {
        &self.derived
    }

    pub fn efficiency(&self) -> f64 {
        self.config.efficiency
    }

    /// Not used by the dispatch model yet.
    pub fn classify_start(&self, hours_offline: f64) -> StartKind {
        if hours_offline <= self.config.hot_start_within_hours {
            StartKind::Hot
        } else if hours_offline <= self.config.warm_start_within_hours {
            StartKind::Warm
        } else {
            StartKind::Cold
        }
    }

    pub fn start_cost_eur(&self, kind: StartKind) -> f64 {
        match kind {
            StartKind::Hot => self.derived.hot_start_cost_eur,
            StartKind::Warm => self.derived.warm_start_cost_eur,
            StartKind::Cold => self.derived.cold_start_cost_eur,
        }
    }
}

impl TryFrom<PlantConfig> for PlantProfile {
    type Error = DispatchError;

    fn try_from(config: PlantConfig) -> Result<Self> {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_reference_plant_derivation() {
        let profile = PlantProfile::new(PlantConfig::default()).unwrap();
        let derived = profile.derived();

        assert_eq!(derived.min_mw, 20.0);
        assert_eq!(derived.sel_mw, 80.0);
        assert_eq!(derived.mel_mw, 100.0);
        assert_eq!(derived.rated_consumption_mw, 200.0);
        assert_eq!(derived.depreciation_eur, 200.0);
        assert!((derived.ramping_rate_mw.rmp - 2.5).abs() < 1e-9);
        assert!((derived.ramping_rate_mw.nrm - 10.0).abs() < 1e-9);
        assert_eq!(derived.ramping_cost.bse, 30.0);
        assert_eq!(derived.hot_start_cost_eur, 2000.0);
        assert_eq!(derived.band_width_mw(Band::Rmp), 60.0);
        assert_eq!(derived.band_width_mw(Band::Nrm), 20.0);
    }

    #[test]
    fn test_derivation_does_not_alias_template() {
        let template = PlantConfig::default();
        let small = PlantProfile::new(PlantConfig {
            capacity_mw: 10.0,
            ..template.clone()
        })
        .unwrap();
        let large = PlantProfile::new(PlantConfig {
            capacity_mw: 1000.0,
            ..template.clone()
        })
        .unwrap();

        assert!((small.derived().ramping_rate_mw.nrm - 1.0).abs() < 1e-9);
        assert!((large.derived().ramping_rate_mw.nrm - 100.0).abs() < 1e-9);
        assert_eq!(template.ramping_rate_nrm, 0.1);
    }

    #[test]
    fn test_update_rederives() {
        let profile = PlantProfile::new(PlantConfig::default()).unwrap();
        let updated = profile.update(|c| c.capacity_mw = 200.0).unwrap();

        assert_eq!(updated.derived().mel_mw, 200.0);
        assert_eq!(profile.derived().mel_mw, 100.0);
    }

    #[rstest]
    #[case::zero_capacity(|c: &mut PlantConfig| c.capacity_mw = 0.0)]
    #[case::negative_capacity(|c: &mut PlantConfig| c.capacity_mw = -5.0)]
    #[case::zero_efficiency(|c: &mut PlantConfig| c.efficiency = 0.0)]
    #[case::efficiency_above_one(|c: &mut PlantConfig| c.efficiency = 1.2)]
    #[case::fraction_above_one(|c: &mut PlantConfig| c.mel_fraction = 1.5)]
    #[case::negative_fraction(|c: &mut PlantConfig| c.min_fraction = -0.1)]
    #[case::ramping_fraction(|c: &mut PlantConfig| c.ramping_rate_rmp = 2.0)]
    #[case::unordered_fractions(|c: &mut PlantConfig| c.sel_fraction = 0.1)]
    #[case::nan_capacity(|c: &mut PlantConfig| c.capacity_mw = f64::NAN)]
    #[case::negative_cost(|c: &mut PlantConfig| c.depreciation = -1.0)]
    #[case::empty_id(|c: &mut PlantConfig| c.id.clear())]
    fn test_invalid_config_rejected(#[case] change: fn(&mut PlantConfig)) {
        let mut config = PlantConfig::default();
        change(&mut config);
        let err = PlantProfile::new(config).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)), "{err}");
    }

    #[test]
    fn test_efficiency_of_one_is_valid() {
        let config = PlantConfig {
            efficiency: 1.0,
            ..PlantConfig::default()
        };
        assert!(PlantProfile::new(config).is_ok());
    }

    #[rstest]
    #[case(1.0, StartKind::Hot)]
    #[case(3.0, StartKind::Hot)]
    #[case(8.0, StartKind::Warm)]
    #[case(48.0, StartKind::Cold)]
    fn test_classify_start(#[case] hours: f64, #[case] expected: StartKind) {
        let profile = PlantProfile::new(PlantConfig::default()).unwrap();
        assert_eq!(profile.classify_start(hours), expected);
    }

    proptest! {
        #[test]
        fn prop_derived_bounds_are_ordered(
            capacity in 0.1f64..5000.0,
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
            c in 0.0f64..=1.0,
        ) {
            let mut fractions = [a, b, c];
            fractions.sort_by(|x, y| x.partial_cmp(y).unwrap());
            let config = PlantConfig {
                capacity_mw: capacity,
                min_fraction: fractions[0],
                sel_fraction: fractions[1],
                mel_fraction: fractions[2],
                ..PlantConfig::default()
            };
            let profile = PlantProfile::new(config).unwrap();
            let d = profile.derived();
            prop_assert!(0.0 <= d.min_mw);
            prop_assert!(d.min_mw <= d.sel_mw);
            prop_assert!(d.sel_mw <= d.mel_mw);
            prop_assert!(d.mel_mw <= capacity + 1e-9);
        }
    }
}
