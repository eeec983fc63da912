use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{FuelCategory, GroupKey, Market, VehicleRecord};
use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Filter specification: an immutable value passed into every query
// ---------------------------------------------------------------------------

/// The presentation layer's current selection.
///
/// For each allow-list:
/// * `None` → no constraint
/// * `Some(empty)` → nothing selected → nothing passes
/// * `Some(set)` → the record's value must be in the set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub year_min: i32,
    pub year_max: i32,
    #[serde(default)]
    pub markets: Option<BTreeSet<Market>>,
    /// Matched case-insensitively.
    #[serde(default)]
    pub manufacturers: Option<BTreeSet<String>>,
    #[serde(default)]
    pub fuel_categories: Option<BTreeSet<FuelCategory>>,
    #[serde(default)]
    pub group_by: Option<GroupKey>,
    /// Composite indices to compute; `None` means all configured ones.
    #[serde(default)]
    pub active_indices: Option<BTreeSet<String>>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::years(2000, 2025)
    }
}

impl FilterSpec {
    /// Year window with every other predicate open.
    pub fn years(year_min: i32, year_max: i32) -> Self {
        Self {
            year_min,
            year_max,
            markets: None,
            manufacturers: None,
            fuel_categories: None,
            group_by: None,
            active_indices: None,
        }
    }

    pub fn with_markets<I: IntoIterator<Item = Market>>(mut self, markets: I) -> Self {
        self.markets = Some(markets.into_iter().collect());
        self
    }

    pub fn with_manufacturers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manufacturers = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_fuel_categories<I: IntoIterator<Item = FuelCategory>>(mut self, cats: I) -> Self {
        self.fuel_categories = Some(cats.into_iter().collect());
        self
    }

    pub fn grouped_by(mut self, key: GroupKey) -> Self {
        self.group_by = Some(key);
        self
    }

    pub fn with_active_indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_indices = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Re-validate the year window.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.year_min > self.year_max {
            return Err(QueryError::InvalidRange {
                year_min: self.year_min,
                year_max: self.year_max,
            });
        }
        Ok(())
    }

    /// Whether a record passes every active predicate.
    pub fn matches(&self, record: &VehicleRecord) -> bool {
        if record.year < self.year_min || record.year > self.year_max {
            return false;
        }
        if let Some(markets) = &self.markets {
            if !markets.contains(&record.market) {
                return false;
            }
        }
        if let Some(makes) = &self.manufacturers {
            if !makes
                .iter()
                .any(|m| m.trim().eq_ignore_ascii_case(&record.manufacturer))
            {
                return false;
            }
        }
        if let Some(cats) = &self.fuel_categories {
            if !cats.contains(&record.fuel_type_category) {
                return false;
            }
        }
        true
    }
}

/// Return indices of records that pass the filter, in input order.
pub fn filtered_indices(records: &[VehicleRecord], spec: &FilterSpec) -> Result<Vec<usize>, QueryError> {
    spec.validate()?;
    Ok(records
        .iter()
        .enumerate()
        .filter(|(_, rec)| spec.matches(rec))
        .map(|(i, _)| i)
        .collect())
}

/// Return the records that pass the filter, in input order.
///
/// An empty result is `Ok`; the queries built on top decide whether
/// emptiness is an error.
pub fn apply_filter<'a>(
    records: &'a [VehicleRecord],
    spec: &FilterSpec,
) -> Result<Vec<&'a VehicleRecord>, QueryError> {
    spec.validate()?;
    Ok(records.iter().filter(|rec| spec.matches(rec)).collect())
}
