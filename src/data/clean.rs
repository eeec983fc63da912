use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::model::{
    epa_cols, sports_cols, FuelCategory, Market, RawRow, RawTable, RawValue, VehicleRecord,
    UNKNOWN_MANUFACTURER,
};
use crate::config::{AnalysisConfig, YearRange};
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Fuel label lookup
// ---------------------------------------------------------------------------

const GASOLINE_LABELS: &[&str] = &[
    "Regular",
    "Premium",
    "Midgrade",
    "Gasoline or E85",
    "Premium or E85",
    "Diesel",
    "Gasoline or natural gas",
    "CNG",
    "Gasoline",
];

const ELECTRIC_LABELS: &[&str] = &[
    "Electricity",
    "Regular Gas and Electricity",
    "Premium Gas or Electricity",
    "Premium and Electricity",
    "Regular Gas or Electricity",
    "Electric",
];

/// Case-insensitive map from raw fuel-type label to [`FuelCategory`].
#[derive(Debug, Clone)]
pub struct FuelLabelTable {
    labels: HashMap<String, FuelCategory>,
}

impl Default for FuelLabelTable {
    fn default() -> Self {
        let labels = GASOLINE_LABELS
            .iter()
            .map(|l| (l.to_lowercase(), FuelCategory::Gasoline))
            .chain(
                ELECTRIC_LABELS
                    .iter()
                    .map(|l| (l.to_lowercase(), FuelCategory::Electric)),
            )
            .collect();
        FuelLabelTable { labels }
    }
}

impl FuelLabelTable {
    /// Built-in table plus `extra` (extra entries win).
    pub fn with_overrides(extra: &BTreeMap<String, FuelCategory>) -> Self {
        let mut table = Self::default();
        for (label, category) in extra {
            table.labels.insert(label.trim().to_lowercase(), *category);
        }
        table
    }

    pub fn categorize(&self, label: &str) -> Option<FuelCategory> {
        self.labels.get(&label.trim().to_lowercase()).copied()
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?|\.[0-9]+").expect("static regex"));

const ABSENT_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "-"];

fn is_absent_token(s: &str) -> bool {
    ABSENT_TOKENS.contains(&s.trim().to_lowercase().as_str())
}

/// Parse a numeric cell.
///
/// * null / absent marker → `Ok(None)`
/// * `"1,500"`, `"$99,000"` → separators and currency stripped
/// * `"1,500+"`, `"4.0 (hybrid)"` → first numeric substring
/// * no digits at all, negative or non-finite → `MalformedNumber`
fn parse_number(field: &'static str, cell: Option<&RawValue>) -> Result<Option<f64>, ValidationError> {
    let malformed = |raw: String| ValidationError::MalformedNumber { field, raw };

    let value = match cell {
        None | Some(RawValue::Null) => return Ok(None),
        Some(RawValue::Integer(i)) => *i as f64,
        Some(RawValue::Float(f)) if f.is_nan() => return Ok(None),
        Some(RawValue::Float(f)) => *f,
        Some(RawValue::Bool(b)) => return Err(malformed(b.to_string())),
        Some(RawValue::Text(s)) => {
            if is_absent_token(s) {
                return Ok(None);
            }
            let stripped: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '$'))
                .collect();
            match stripped.parse::<f64>() {
                Ok(v) => v,
                Err(_) => NUMBER
                    .find(&stripped)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .ok_or_else(|| malformed(s.clone()))?,
            }
        }
    };

    if !value.is_finite() || value < 0.0 {
        return Err(malformed(value.to_string()));
    }
    Ok(Some(value))
}

fn parse_year(cell: Option<&RawValue>, range: YearRange) -> Result<i32, ValidationError> {
    let year = match cell {
        None | Some(RawValue::Null) => return Err(ValidationError::MissingYear),
        Some(RawValue::Integer(i)) => i32::try_from(*i)
            .map_err(|_| ValidationError::MalformedYear(i.to_string()))?,
        Some(RawValue::Float(f)) if f.fract() == 0.0 && f.abs() < i32::MAX as f64 => *f as i32,
        Some(RawValue::Text(s)) if s.trim().is_empty() => return Err(ValidationError::MissingYear),
        Some(RawValue::Text(s)) => {
            let t = s.trim();
            match t.parse::<i32>() {
                Ok(y) => y,
                Err(_) => match t.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 && f.abs() < i32::MAX as f64 => f as i32,
                    _ => return Err(ValidationError::MalformedYear(s.clone())),
                },
            }
        }
        Some(other) => return Err(ValidationError::MalformedYear(other.to_string())),
    };

    if !range.contains(year) {
        return Err(ValidationError::OutOfRangeYear {
            year,
            min: range.min,
            max: range.max,
        });
    }
    Ok(year)
}

fn text_field(row: &RawRow, column: &str) -> Option<String> {
    row.get(column).and_then(RawValue::as_text)
}

fn mentions_electric(cell: Option<&RawValue>) -> bool {
    match cell {
        Some(RawValue::Text(s)) => {
            s.to_lowercase().contains("electric") && !s.chars().any(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Row cleaner
// ---------------------------------------------------------------------------

/// Validates raw rows of one market into [`VehicleRecord`]s.
#[derive(Debug, Clone)]
pub struct Cleaner {
    market: Market,
    years: YearRange,
    fuel_labels: FuelLabelTable,
    exclude_performance_models: bool,
    deduplicate: bool,
}

impl Cleaner {
    /// A cleaner with the built-in fuel table and no dataset-level passes.
    pub fn new(market: Market, years: YearRange) -> Self {
        Self {
            market,
            years,
            fuel_labels: FuelLabelTable::default(),
            exclude_performance_models: false,
            deduplicate: false,
        }
    }

    pub fn from_config(market: Market, config: &AnalysisConfig) -> Self {
        Self {
            market,
            years: config.year_range(market),
            fuel_labels: FuelLabelTable::with_overrides(&config.extra_fuel_labels),
            exclude_performance_models: market == Market::Epa && config.exclude_performance_models,
            deduplicate: market == Market::Sports && config.deduplicate_sports,
        }
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Clean a single row. Pure: depends only on the row and the rules.
    pub fn clean_row(&self, row: &RawRow) -> Result<VehicleRecord, ValidationError> {
        match self.market {
            Market::Sports => self.clean_sports_row(row),
            Market::Epa => self.clean_epa_row(row),
        }
    }

    fn categorize(&self, label: &str) -> Result<FuelCategory, ValidationError> {
        self.fuel_labels
            .categorize(label)
            .ok_or_else(|| ValidationError::UnknownFuelType(label.to_string()))
    }

    fn clean_sports_row(&self, row: &RawRow) -> Result<VehicleRecord, ValidationError> {
        let year = parse_year(row.get(sports_cols::YEAR), self.years)?;

        let engine_cell = row.get(sports_cols::ENGINE_SIZE);
        let electric_engine = mentions_electric(engine_cell);
        let engine_displacement_l = if electric_engine {
            None
        } else {
            parse_number("engine_displacement_l", engine_cell)?
        };

        let fuel_type_category = match text_field(row, sports_cols::FUEL_TYPE) {
            Some(label) => self.categorize(&label)?,
            None if electric_engine => FuelCategory::Electric,
            None => FuelCategory::Gasoline,
        };

        let horsepower = parse_number("horsepower", row.get(sports_cols::HORSEPOWER))?;
        let accel_0_60_s = parse_number("accel_0_60_s", row.get(sports_cols::ACCEL))?;
        let price_usd = parse_number("price_usd", row.get(sports_cols::PRICE))?;

        if [horsepower, engine_displacement_l, price_usd, accel_0_60_s]
            .iter()
            .all(Option::is_none)
        {
            return Err(ValidationError::MissingCoreMetrics);
        }

        Ok(VehicleRecord {
            market: Market::Sports,
            year,
            manufacturer: text_field(row, sports_cols::MAKE)
                .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string()),
            model: text_field(row, sports_cols::MODEL),
            horsepower,
            engine_displacement_l,
            price_usd,
            accel_0_60_s,
            combined_mpg: None,
            co2_g_per_mi: None,
            fuel_type_category,
        })
    }

    fn clean_epa_row(&self, row: &RawRow) -> Result<VehicleRecord, ValidationError> {
        let year = parse_year(row.get(epa_cols::YEAR), self.years)?;

        let label = text_field(row, epa_cols::FUEL_TYPE).ok_or(ValidationError::MissingFuelType)?;
        let fuel_type_category = self.categorize(&label)?;

        let combined_mpg = parse_number("combined_mpg", row.get(epa_cols::COMBINED_MPG))?;
        if let Some(mpg) = combined_mpg {
            if mpg <= 0.0 {
                return Err(ValidationError::MalformedNumber {
                    field: "combined_mpg",
                    raw: mpg.to_string(),
                });
            }
        }
        let co2_g_per_mi = parse_number("co2_g_per_mi", row.get(epa_cols::CO2))?;
        let engine_displacement_l =
            parse_number("engine_displacement_l", row.get(epa_cols::DISPLACEMENT))?;
        let horsepower = parse_number("horsepower", row.get(epa_cols::HORSEPOWER))?;

        if [combined_mpg, co2_g_per_mi, horsepower, engine_displacement_l]
            .iter()
            .all(Option::is_none)
        {
            return Err(ValidationError::MissingCoreMetrics);
        }

        Ok(VehicleRecord {
            market: Market::Epa,
            year,
            manufacturer: text_field(row, epa_cols::MAKE)
                .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string()),
            model: text_field(row, epa_cols::MODEL),
            horsepower,
            engine_displacement_l,
            price_usd: None,
            accel_0_60_s: None,
            combined_mpg,
            co2_g_per_mi,
            fuel_type_category,
        })
    }

    /// Clean a whole table: every row, then the dataset-level passes
    /// (EPA performance exclusion, sports deduplication).
    ///
    /// Accepted records keep input order. Rejections are summarised, never raised.
    pub fn clean_table(&self, table: &RawTable) -> CleanedDataset {
        let mut report = CleaningReport::new(self.market, table.len());
        let mut records: Vec<(usize, VehicleRecord)> = Vec::with_capacity(table.len());

        for (row_no, row) in table.rows.iter().enumerate() {
            match self.clean_row(row) {
                Ok(record) => records.push((row_no, record)),
                Err(err) => report.reject(row_no, err),
            }
        }

        if self.exclude_performance_models {
            records.retain(|(row_no, rec)| {
                let keep = !is_performance_model(rec);
                if !keep {
                    report.reject(*row_no, ValidationError::PerformanceModel);
                }
                keep
            });
        }

        if self.deduplicate {
            let dupes = duplicate_rows(&records);
            for &row_no in &dupes {
                report.reject(row_no, ValidationError::Duplicate);
            }
            let dupes: HashSet<usize> = dupes.into_iter().collect();
            records.retain(|(row_no, _)| !dupes.contains(row_no));
        }

        report.accepted = records.len();
        log::info!("{report}");

        CleanedDataset {
            market: self.market,
            records: records.into_iter().map(|(_, rec)| rec).collect(),
            report,
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset-level passes
// ---------------------------------------------------------------------------

const PERFORMANCE_BRANDS: &[&str] = &[
    "Porsche", "Ferrari", "Lamborghini", "McLaren", "Aston Martin", "Bentley", "Bugatti",
    "Maserati", "Lotus", "Alfa Romeo", "Rolls-Royce", "Koenigsegg", "Pagani", "Alpine",
    "Ariel", "Spyker", "TVR", "Morgan", "Caterham", "Pininfarina", "Rimac", "W Motors",
    "Ultima",
];

const PERFORMANCE_MODELS: &[&str] = &[
    "M2", "M3", "M4", "M5", "M6", "M8", "X5 M", "X6 M", "X3 M", "X4 M", "i8",
    "R8", "RS3", "RS4", "RS5", "RS6", "RS7", "TT RS", "S3", "S4", "S5", "S6", "S7", "S8",
    "RS e-tron GT",
    "AMG GT", "C63", "E63", "S63", "G63", "GLE63", "GLS63", "CLA45", "A45", "SL63", "SL65",
    "C43", "E43", "GLE43", "GLC43", "SLS AMG",
    "LC 500", "RC F", "GS F", "IS F",
    "F-Type", "F-PACE SVR", "XE SV", "XF R",
    "CTS-V", "ATS-V", "CT5-V", "CT4-V", "Blackwing",
    "Corvette", "Mustang GT", "Mustang Shelby", "Mustang Mach 1", "GT350", "GT500",
    "Camaro SS", "Camaro ZL1", "Camaro Z28",
    "Challenger Hellcat", "Challenger SRT", "Charger Hellcat", "Charger SRT", "Viper",
    "GT-R", "370Z", "350Z", "400Z",
    "Supra", "GR Supra", "86",
    "Type R", "NSX",
    "WRX STI", "BRZ",
    "Veloster N",
    "Stinger GT",
];

/// Brands match the whole manufacturer name; model keywords match anywhere
/// in the model name. Both ignore case, so "M340i" and "GT86" count too.
fn is_performance_model(record: &VehicleRecord) -> bool {
    if PERFORMANCE_BRANDS
        .iter()
        .any(|b| b.eq_ignore_ascii_case(&record.manufacturer))
    {
        return true;
    }
    record
        .model
        .as_deref()
        .map(str::to_lowercase)
        .is_some_and(|model| {
            PERFORMANCE_MODELS
                .iter()
                .any(|kw| model.contains(&kw.to_lowercase()))
        })
}

/// Row numbers of sports records that repeat an earlier make/model/year.
/// A missing model is a key value of its own. The survivor is the row with
/// the highest price; ties keep the first seen.
fn duplicate_rows(records: &[(usize, VehicleRecord)]) -> Vec<usize> {
    let mut best: HashMap<(String, Option<String>, i32), usize> = HashMap::new();
    let mut dropped = Vec::new();

    for (pos, (row_no, rec)) in records.iter().enumerate() {
        let key = (
            rec.manufacturer.trim().to_lowercase(),
            rec.model.as_deref().map(|m| m.trim().to_lowercase()),
            rec.year,
        );
        match best.get(&key).copied() {
            None => {
                best.insert(key, pos);
            }
            Some(kept_pos) => {
                let (kept_row, kept) = &records[kept_pos];
                let price = rec.price_usd.unwrap_or(f64::NEG_INFINITY);
                let kept_price = kept.price_usd.unwrap_or(f64::NEG_INFINITY);
                if price > kept_price {
                    dropped.push(*kept_row);
                    best.insert(key, pos);
                } else {
                    dropped.push(*row_no);
                }
            }
        }
    }
    dropped
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Accepted records of one market plus the rejection summary.
#[derive(Debug, Clone)]
pub struct CleanedDataset {
    pub market: Market,
    pub records: Vec<VehicleRecord>,
    pub report: CleaningReport,
}

/// Rejection summary for one cleaning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningReport {
    pub market: Market,
    pub rows_seen: usize,
    pub accepted: usize,
    /// Rejection kind → count.
    pub rejections: BTreeMap<&'static str, usize>,
    /// First few rejections, for diagnostics.
    pub examples: Vec<(usize, ValidationError)>,
}

const MAX_EXAMPLES: usize = 10;

impl CleaningReport {
    fn new(market: Market, rows_seen: usize) -> Self {
        Self {
            market,
            rows_seen,
            accepted: 0,
            rejections: BTreeMap::new(),
            examples: Vec::new(),
        }
    }

    fn reject(&mut self, row_no: usize, err: ValidationError) {
        log::debug!("{} row {row_no} rejected: {err}", self.market);
        *self.rejections.entry(err.kind()).or_insert(0) += 1;
        if self.examples.len() < MAX_EXAMPLES {
            self.examples.push((row_no, err));
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.rejections.get(kind).copied().unwrap_or(0)
    }
}

impl fmt::Display for CleaningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rows, {} accepted, {} rejected",
            self.market,
            self.rows_seen,
            self.accepted,
            self.rejected()
        )?;
        if !self.rejections.is_empty() {
            let reasons: Vec<String> = self
                .rejections
                .iter()
                .map(|(kind, n)| format!("{kind}={n}"))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        Ok(())
    }
}
