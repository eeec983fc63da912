use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RawValue – a single loosely-typed cell from an input table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell as it comes out of CSV / JSON / Parquet.
/// Nothing downstream of the cleaner sees these.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Text(s) => write!(f, "{s}"),
            RawValue::Integer(i) => write!(f, "{i}"),
            RawValue::Float(v) => write!(f, "{v}"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Null => write!(f, "<null>"),
        }
    }
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Text view of the cell; `None` for nulls and blank strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Text(s) if s.trim().is_empty() => None,
            RawValue::Text(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Integer(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One input row: column name → cell.
pub type RawRow = BTreeMap<String, RawValue>;

// ---------------------------------------------------------------------------
// RawTable – a loaded input file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
    /// Sorted union of column names over all rows.
    pub columns: Vec<String>,
}

impl RawTable {
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        let columns: BTreeSet<String> = rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect();
        RawTable {
            rows,
            columns: columns.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Canonical vehicle types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Market {
    Sports,
    #[serde(rename = "EPA")]
    Epa,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Sports, Market::Epa];
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Sports => write!(f, "Sports"),
            Market::Epa => write!(f, "EPA"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FuelCategory {
    Gasoline,
    Electric,
}

impl fmt::Display for FuelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelCategory::Gasoline => write!(f, "Gasoline"),
            FuelCategory::Electric => write!(f, "Electric"),
        }
    }
}

/// Secondary grouping key for aggregation (year is always the primary key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Manufacturer,
    FuelCategory,
}

impl GroupKey {
    /// Manufacturer groups are trimmed and lowercased, matching how the
    /// manufacturer filter compares names.
    pub fn value_of(self, record: &VehicleRecord) -> String {
        match self {
            GroupKey::Manufacturer => record.manufacturer.trim().to_lowercase(),
            GroupKey::FuelCategory => record.fuel_type_category.to_string(),
        }
    }
}

/// Numeric per-vehicle metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Horsepower,
    EngineDisplacement,
    PriceUsd,
    Accel0To60,
    CombinedMpg,
    Co2GramsPerMile,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Horsepower,
        Metric::EngineDisplacement,
        Metric::PriceUsd,
        Metric::Accel0To60,
        Metric::CombinedMpg,
        Metric::Co2GramsPerMile,
    ];

    /// Read this metric off a record.
    pub fn value(self, record: &VehicleRecord) -> Option<f64> {
        match self {
            Metric::Horsepower => record.horsepower,
            Metric::EngineDisplacement => record.engine_displacement_l,
            Metric::PriceUsd => record.price_usd,
            Metric::Accel0To60 => record.accel_0_60_s,
            Metric::CombinedMpg => record.combined_mpg,
            Metric::Co2GramsPerMile => record.co2_g_per_mi,
        }
    }

    /// Whether records of `market` can ever populate this metric.
    pub fn applies_to(self, market: Market) -> bool {
        match self {
            Metric::Horsepower | Metric::EngineDisplacement => true,
            Metric::PriceUsd | Metric::Accel0To60 => market == Market::Sports,
            Metric::CombinedMpg | Metric::Co2GramsPerMile => market == Market::Epa,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Horsepower => "horsepower",
            Metric::EngineDisplacement => "engine_displacement_l",
            Metric::PriceUsd => "price_usd",
            Metric::Accel0To60 => "accel_0_60_s",
            Metric::CombinedMpg => "combined_mpg",
            Metric::Co2GramsPerMile => "co2_g_per_mi",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Manufacturer recorded when the source row has none.
pub const UNKNOWN_MANUFACTURER: &str = "Unknown";

// ---------------------------------------------------------------------------
// VehicleRecord – one cleaned row
// ---------------------------------------------------------------------------

/// A validated vehicle model-year. Immutable once built by the cleaner.
///
/// Market-specific metrics are always `None` for the other market
/// (Sports never carries MPG, EPA never carries price).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub market: Market,
    pub year: i32,
    pub manufacturer: String,
    pub model: Option<String>,
    pub horsepower: Option<f64>,
    pub engine_displacement_l: Option<f64>,
    pub price_usd: Option<f64>,
    pub accel_0_60_s: Option<f64>,
    pub combined_mpg: Option<f64>,
    pub co2_g_per_mi: Option<f64>,
    pub fuel_type_category: FuelCategory,
}

impl VehicleRecord {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        metric.value(self)
    }

    /// Horsepower per litre of displacement. `None` without a positive
    /// displacement (electric drivetrains).
    pub fn specific_output(&self) -> Option<f64> {
        match (self.horsepower, self.engine_displacement_l) {
            (Some(hp), Some(disp)) if disp > 0.0 => Some(hp / disp),
            _ => None,
        }
    }

    /// Re-serialize into the market's raw column schema.
    pub fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::new();
        let mut put = |col: &str, value: RawValue| {
            row.insert(col.to_string(), value);
        };
        let fuel = RawValue::Text(self.fuel_type_category.to_string());
        match self.market {
            Market::Sports => {
                put(sports_cols::MAKE, self.manufacturer.as_str().into());
                put(sports_cols::MODEL, self.model.as_deref().into());
                put(sports_cols::YEAR, RawValue::Integer(self.year as i64));
                put(sports_cols::ENGINE_SIZE, self.engine_displacement_l.into());
                put(sports_cols::HORSEPOWER, self.horsepower.into());
                put(sports_cols::ACCEL, self.accel_0_60_s.into());
                put(sports_cols::PRICE, self.price_usd.into());
                put(sports_cols::FUEL_TYPE, fuel);
            }
            Market::Epa => {
                put(epa_cols::MAKE, self.manufacturer.as_str().into());
                put(epa_cols::MODEL, self.model.as_deref().into());
                put(epa_cols::YEAR, RawValue::Integer(self.year as i64));
                put(epa_cols::FUEL_TYPE, fuel);
                put(epa_cols::COMBINED_MPG, self.combined_mpg.into());
                put(epa_cols::CO2, self.co2_g_per_mi.into());
                put(epa_cols::DISPLACEMENT, self.engine_displacement_l.into());
                put(epa_cols::HORSEPOWER, self.horsepower.into());
            }
        }
        row
    }
}

/// Raw column names of the sports-car price table.
pub mod sports_cols {
    pub const MAKE: &str = "Car Make";
    pub const MODEL: &str = "Car Model";
    pub const YEAR: &str = "Year";
    pub const ENGINE_SIZE: &str = "Engine Size (L)";
    pub const HORSEPOWER: &str = "Horsepower";
    pub const ACCEL: &str = "0-60 MPH Time (seconds)";
    pub const PRICE: &str = "Price (in USD)";
    pub const FUEL_TYPE: &str = "Fuel Type";
}

/// Raw column names of the EPA all-vehicles table.
pub mod epa_cols {
    pub const MAKE: &str = "Make";
    pub const MODEL: &str = "Model";
    pub const YEAR: &str = "Year";
    pub const FUEL_TYPE: &str = "Fuel Type";
    pub const COMBINED_MPG: &str = "Combined Mpg For Fuel Type1";
    // The export really has two spaces here.
    pub const CO2: &str = "Co2  Tailpipe For Fuel Type1";
    pub const DISPLACEMENT: &str = "Engine displacement";
    pub const HORSEPOWER: &str = "Horsepower (est)";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sports(year: i32, hp: f64, disp: Option<f64>) -> VehicleRecord {
        VehicleRecord {
            market: Market::Sports,
            year,
            manufacturer: "Porsche".into(),
            model: Some("911".into()),
            horsepower: Some(hp),
            engine_displacement_l: disp,
            price_usd: Some(100_000.0),
            accel_0_60_s: Some(3.5),
            combined_mpg: None,
            co2_g_per_mi: None,
            fuel_type_category: FuelCategory::Gasoline,
        }
    }

    #[test]
    fn test_metric_applicability() {
        assert!(Metric::PriceUsd.applies_to(Market::Sports));
        assert!(!Metric::PriceUsd.applies_to(Market::Epa));
        assert!(Metric::CombinedMpg.applies_to(Market::Epa));
        assert!(!Metric::CombinedMpg.applies_to(Market::Sports));
        assert!(Metric::Horsepower.applies_to(Market::Epa));
    }

    #[test]
    fn test_specific_output_requires_positive_displacement() {
        assert_eq!(sports(2020, 400.0, Some(4.0)).specific_output(), Some(100.0));
        assert_eq!(sports(2020, 400.0, Some(0.0)).specific_output(), None);
        assert_eq!(sports(2020, 400.0, None).specific_output(), None);
    }

    #[test]
    fn test_raw_row_uses_market_schema() {
        let row = sports(2021, 500.0, None).to_raw_row();
        assert_eq!(row.get(sports_cols::YEAR), Some(&RawValue::Integer(2021)));
        assert_eq!(row.get(sports_cols::ENGINE_SIZE), Some(&RawValue::Null));
        assert_eq!(
            row.get(sports_cols::FUEL_TYPE),
            Some(&RawValue::Text("Gasoline".into()))
        );
        assert!(!row.contains_key(epa_cols::COMBINED_MPG));
    }

    #[test]
    fn test_manufacturer_group_ignores_case() {
        let mut shouting = sports(2020, 400.0, None);
        shouting.manufacturer = " PORSCHE ".into();
        assert_eq!(GroupKey::Manufacturer.value_of(&sports(2020, 400.0, None)), "porsche");
        assert_eq!(GroupKey::Manufacturer.value_of(&shouting), "porsche");
        assert_eq!(GroupKey::FuelCategory.value_of(&shouting), "Gasoline");
    }

    #[test]
    fn test_raw_value_text_view() {
        assert_eq!(RawValue::Text("  ".into()).as_text(), None);
        assert_eq!(RawValue::Integer(7).as_text().as_deref(), Some("7"));
        assert_eq!(RawValue::Null.as_text(), None);
    }
}
