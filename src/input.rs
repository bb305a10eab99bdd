//! File formats at the command-line boundary.
//!
//! A plant is a flat TOML table holding every [`PlantConfig`] field; unknown
//! keys are rejected. Prices are JSON:
//!
//! ```json
//! { "index": [0, 1, 2], "wholesale_price": [..], "clean_fuel_price": [..] }
//! ```
//!
//! `index` is optional and may hold integers or RFC 3339 timestamps.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    DispatchResult, DispatchRow, DispatchSummary, IndexValue, MarketPrices, PlantConfig,
    PlantProfile,
};

#[derive(Debug, Deserialize)]
pub struct PriceFile {
    #[serde(default)]
    pub index: Option<Vec<IndexValue>>,
    pub wholesale_price: Vec<f64>,
    pub clean_fuel_price: Vec<f64>,
}

impl PriceFile {
    pub fn into_market_prices(self) -> crate::error::Result<MarketPrices> {
        MarketPrices::from_columns(self.index.as_deref(), self.wholesale_price, self.clean_fuel_price)
    }
}

pub fn load_plant(path: &Path) -> Result<PlantProfile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading plant file {}", path.display()))?;
    let config: PlantConfig =
        toml::from_str(&text).with_context(|| format!("parsing plant file {}", path.display()))?;
    PlantProfile::new(config).with_context(|| format!("invalid plant in {}", path.display()))
}

pub fn load_prices(path: &Path) -> Result<MarketPrices> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading price file {}", path.display()))?;
    let file: PriceFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing price file {}", path.display()))?;
    file.into_market_prices()
        .with_context(|| format!("invalid prices in {}", path.display()))
}

/// JSON document written for a finished run.
#[derive(Debug, Serialize)]
pub struct ResultDocument {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub plant_id: String,
    pub summary: DispatchSummary,
    pub rows: Vec<DispatchRow>,
}

impl From<&DispatchResult> for ResultDocument {
    fn from(result: &DispatchResult) -> Self {
        Self {
            id: result.id,
            created_at: result.created_at,
            plant_id: result.plant_id.clone(),
            summary: result.summary(),
            rows: result.rows(),
        }
    }
}

/// Write the result as pretty JSON to `output`, or stdout when `None`.
pub fn write_result(result: &DispatchResult, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&ResultDocument::from(result))?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("writing result to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeIndex;
    use chrono::{TimeDelta, TimeZone};

    fn plant_file(dir: &tempfile::TempDir, config: &PlantConfig) -> std::path::PathBuf {
        let path = dir.path().join("plant.toml");
        std::fs::write(&path, toml::to_string(config).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_complete_plant_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlantConfig {
            id: "unit-7".to_string(),
            capacity_mw: 250.0,
            ..PlantConfig::default()
        };

        let profile = load_plant(&plant_file(&dir, &config)).unwrap();
        assert_eq!(profile.id(), "unit-7");
        assert_eq!(profile.derived().mel_mw, 250.0);
        assert_eq!(profile.efficiency(), 0.5);
    }

    #[test]
    fn test_misspelled_plant_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = plant_file(&dir, &PlantConfig::default());
        let text = std::fs::read_to_string(&path).unwrap().replace("efficiency", "efficency");
        std::fs::write(&path, text).unwrap();

        let err = load_plant(&path).unwrap_err();
        assert!(format!("{err:#}").contains("efficency"), "{err:#}");
    }

    #[test]
    fn test_incomplete_plant_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant.toml");
        std::fs::write(&path, "id = \"unit-7\"\ncapacity_mw = 250.0\n").unwrap();

        let err = load_plant(&path).unwrap_err();
        assert!(format!("{err:#}").contains("missing field"), "{err:#}");
    }

    #[test]
    fn test_invalid_plant_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlantConfig {
            efficiency: 1.5,
            ..PlantConfig::default()
        };

        let err = load_plant(&plant_file(&dir, &config)).unwrap_err();
        assert!(format!("{err:#}").contains("invalid plant"), "{err:#}");
    }

    #[test]
    fn test_prices_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");
        std::fs::write(
            &path,
            r#"{
                "index": ["2024-01-01T00:00:00Z", "2024-01-01T01:00:00Z", "2024-01-01T02:00:00Z"],
                "wholesale_price": [40.0, 55.5, 61.0],
                "clean_fuel_price": [20.0, 20.0, 21.0]
            }"#,
        )
        .unwrap();

        let prices = load_prices(&path).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            prices.index(),
            &TimeIndex::datetime(start, TimeDelta::hours(1)).unwrap()
        );
        assert_eq!(prices.wholesale().values(), &[40.0, 55.5, 61.0]);
    }

    #[test]
    fn test_prices_without_index() {
        let file: PriceFile =
            serde_json::from_str(r#"{"wholesale_price": [1, 2], "clean_fuel_price": [3, 4]}"#).unwrap();
        let prices = file.into_market_prices().unwrap();
        assert_eq!(prices.index(), &TimeIndex::integer(0));
        assert_eq!(prices.len(), 2);
    }

    #[test]
    fn test_misaligned_prices() {
        let file: PriceFile =
            serde_json::from_str(r#"{"wholesale_price": [1, 2], "clean_fuel_price": [3]}"#).unwrap();
        assert!(file.into_market_prices().is_err());
    }
}
