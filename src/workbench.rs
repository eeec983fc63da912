use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::analysis::aggregate::{self, ElectricShare, YearlyAggregate};
use crate::analysis::index::{IndexPoint, IndexSeries, min_max_index, normalize_to_base};
use crate::analysis::segment::{self, Segmentation};
use crate::config::{AnalysisConfig, SegmentationConfig};
use crate::data::clean::{Cleaner, CleaningReport};
use crate::data::filter::{FilterSpec, apply_filter, filtered_indices};
use crate::data::loader::load_table;
use crate::data::model::{Market, Metric, RawTable, VehicleRecord};
use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Workbench
// ---------------------------------------------------------------------------

/// Cleaned records of both markets plus the configuration every query reads.
///
/// Holds no selection state: each query takes the caller's [`FilterSpec`]
/// and recomputes from scratch.
#[derive(Debug, Clone)]
pub struct Workbench {
    records: Vec<VehicleRecord>,
    reports: Vec<CleaningReport>,
    config: AnalysisConfig,
}

/// One composite index for one market: the raw yearly scores and, when the
/// base year allows it, the same series rescaled to base = 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSeries {
    pub index: String,
    pub market: Market,
    pub raw: Vec<(i32, Option<f64>)>,
    pub normalized: Option<IndexSeries>,
}

impl Workbench {
    /// Clean both raw tables with the rules in `config`.
    pub fn from_tables(sports: &RawTable, epa: &RawTable, config: AnalysisConfig) -> Self {
        let mut records = Vec::with_capacity(sports.len() + epa.len());
        let mut reports = Vec::with_capacity(2);
        for (market, table) in [(Market::Sports, sports), (Market::Epa, epa)] {
            let cleaned = Cleaner::from_config(market, &config).clean_table(table);
            records.extend(cleaned.records);
            reports.push(cleaned.report);
        }
        Self { records, reports, config }
    }

    /// Wrap records that are already clean.
    pub fn from_records(records: Vec<VehicleRecord>, config: AnalysisConfig) -> Self {
        Self { records, reports: Vec::new(), config }
    }

    /// Load and clean the two source files.
    pub fn load(sports_path: &Path, epa_path: &Path, config: AnalysisConfig) -> Result<Self> {
        let sports = load_table(sports_path)?;
        let epa = load_table(epa_path)?;
        Ok(Self::from_tables(&sports, &epa, config))
    }

    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    pub fn reports(&self) -> &[CleaningReport] {
        &self.reports
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    // -- queries ------------------------------------------------------------

    /// Records passing `spec`, in load order. May be empty.
    pub fn filtered(&self, spec: &FilterSpec) -> Result<Vec<&VehicleRecord>, QueryError> {
        apply_filter(&self.records, spec)
    }

    fn non_empty(&self, spec: &FilterSpec) -> Result<Vec<&VehicleRecord>, QueryError> {
        let records = self.filtered(spec)?;
        if records.is_empty() {
            return Err(QueryError::EmptyResult);
        }
        Ok(records)
    }

    fn in_market(&self, spec: &FilterSpec, market: Market) -> Result<Vec<&VehicleRecord>, QueryError> {
        let records: Vec<&VehicleRecord> = self
            .filtered(spec)?
            .into_iter()
            .filter(|r| r.market == market)
            .collect();
        if records.is_empty() {
            return Err(QueryError::EmptyResult);
        }
        Ok(records)
    }

    /// Yearly aggregates of `metrics`, grouped by `spec.group_by`.
    pub fn yearly_aggregates(
        &self,
        spec: &FilterSpec,
        metrics: &[Metric],
    ) -> Result<Vec<YearlyAggregate>, QueryError> {
        let records = self.non_empty(spec)?;
        aggregate::aggregate(&records, metrics, spec.group_by)
    }

    /// Yearly mean of one metric in one market, rescaled to `base_year` = 100.
    /// `None` uses the earliest year with data.
    pub fn index_series(
        &self,
        spec: &FilterSpec,
        market: Market,
        metric: Metric,
        base_year: Option<i32>,
    ) -> Result<IndexSeries, QueryError> {
        let records = self.in_market(spec, market)?;
        let aggs = aggregate::aggregate(&records, &[metric], None)?;
        let series = aggregate::metric_series(&aggs, market, None, metric);
        normalize_to_base(&format!("{market} {metric}"), &series, base_year)
    }

    /// Yearly mean of one metric in one market, rescaled to 0–100 between
    /// its lowest and highest year.
    pub fn min_max_series(
        &self,
        spec: &FilterSpec,
        market: Market,
        metric: Metric,
    ) -> Result<Vec<IndexPoint>, QueryError> {
        let records = self.in_market(spec, market)?;
        let aggs = aggregate::aggregate(&records, &[metric], None)?;
        let series = aggregate::metric_series(&aggs, market, None, metric);
        min_max_index(&format!("{market} {metric}"), &series)
    }

    /// Raw yearly scores of a configured composite index.
    pub fn composite_series(
        &self,
        spec: &FilterSpec,
        name: &str,
        market: Market,
    ) -> Result<Vec<(i32, Option<f64>)>, QueryError> {
        let index = self
            .config
            .index(name)
            .ok_or_else(|| QueryError::UnknownIndex(name.to_string()))?;
        if !index.applies_to(market) {
            return Err(QueryError::MarketMismatch { index: name.to_string(), market });
        }
        let records = self.in_market(spec, market)?;
        let aggs = aggregate::aggregate(&records, &index.metrics(), None)?;
        Ok(index.series(&aggs, market, None))
    }

    /// Every active index for every market it applies to and that has data.
    ///
    /// The normalized view is left empty (and logged) when the base year
    /// cannot anchor the series, so one flat or null year does not hide the
    /// raw scores.
    pub fn comparison_indices(&self, spec: &FilterSpec) -> Result<Vec<ComparisonSeries>, QueryError> {
        let records = self.non_empty(spec)?;

        let active: Vec<&str> = match &spec.active_indices {
            Some(names) => {
                for name in names {
                    if self.config.index(name).is_none() {
                        return Err(QueryError::UnknownIndex(name.clone()));
                    }
                }
                names.iter().map(String::as_str).collect()
            }
            None => self.config.indices.iter().map(|i| i.name.as_str()).collect(),
        };

        let mut out = Vec::new();
        for name in active {
            let Some(index) = self.config.index(name) else { continue };
            for market in Market::ALL {
                if !index.applies_to(market) {
                    continue;
                }
                let slice: Vec<&VehicleRecord> =
                    records.iter().copied().filter(|r| r.market == market).collect();
                if slice.is_empty() {
                    continue;
                }
                let aggs = aggregate::aggregate(&slice, &index.metrics(), None)?;
                let raw = index.series(&aggs, market, None);
                let normalized = match normalize_to_base(name, &raw, None) {
                    Ok(series) => Some(series),
                    Err(err) => {
                        log::debug!("{market} {name}: {err}");
                        None
                    }
                };
                out.push(ComparisonSeries { index: name.to_string(), market, raw, normalized });
            }
        }
        Ok(out)
    }

    /// Cluster the filtered records with the configured segmentation settings.
    ///
    /// `record_index` of every assignment points into [`records`](Self::records).
    pub fn segment(&self, spec: &FilterSpec) -> Result<Segmentation, QueryError> {
        self.segment_with(spec, &self.config.segmentation)
    }

    /// Same as [`segment`](Self::segment) with a different cluster count.
    pub fn segment_with_k(&self, spec: &FilterSpec, k: usize) -> Result<Segmentation, QueryError> {
        let config = SegmentationConfig { k, ..self.config.segmentation.clone() };
        self.segment_with(spec, &config)
    }

    fn segment_with(
        &self,
        spec: &FilterSpec,
        config: &SegmentationConfig,
    ) -> Result<Segmentation, QueryError> {
        let positions = filtered_indices(&self.records, spec)?;
        let records: Vec<&VehicleRecord> = positions.iter().map(|&i| &self.records[i]).collect();
        let mut segmentation = segment::segment(&records, config)?;
        for assignment in &mut segmentation.assignments {
            assignment.record_index = positions[assignment.record_index];
        }
        Ok(segmentation)
    }

    pub fn electric_share(&self, spec: &FilterSpec) -> Result<Vec<ElectricShare>, QueryError> {
        let records = self.non_empty(spec)?;
        aggregate::electric_share(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::FuelCategory;

    fn sports(year: i32, make: &str, hp: f64, accel: f64, price: f64) -> VehicleRecord {
        VehicleRecord {
            market: Market::Sports,
            year,
            manufacturer: make.to_string(),
            model: None,
            horsepower: Some(hp),
            engine_displacement_l: Some(4.0),
            price_usd: Some(price),
            accel_0_60_s: Some(accel),
            combined_mpg: None,
            co2_g_per_mi: None,
            fuel_type_category: FuelCategory::Gasoline,
        }
    }

    fn epa(year: i32, make: &str, hp: f64, mpg: f64, co2: Option<f64>) -> VehicleRecord {
        VehicleRecord {
            market: Market::Epa,
            year,
            manufacturer: make.to_string(),
            model: None,
            horsepower: Some(hp),
            engine_displacement_l: Some(2.0),
            price_usd: None,
            accel_0_60_s: None,
            combined_mpg: Some(mpg),
            co2_g_per_mi: co2,
            fuel_type_category: FuelCategory::Gasoline,
        }
    }

    fn bench() -> Workbench {
        Workbench::from_records(
            vec![
                sports(2018, "Porsche", 400.0, 4.0, 100_000.0),
                sports(2019, "Porsche", 440.0, 3.8, 105_000.0),
                sports(2019, "Ferrari", 600.0, 3.0, 250_000.0),
                epa(2018, "Honda", 150.0, 30.0, Some(300.0)),
                epa(2019, "Honda", 160.0, 32.0, None),
            ],
            AnalysisConfig::default(),
        )
    }

    #[test]
    fn test_index_series_defaults_to_earliest_year() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019);
        let series = wb.index_series(&spec, Market::Sports, Metric::Horsepower, None).unwrap();
        assert_eq!(series.base_year, 2018);
        assert_eq!(series.value_at(2018), Some(100.0));
        assert_eq!(series.value_at(2019), Some(130.0));
    }

    #[test]
    fn test_composite_errors() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019);
        assert_eq!(
            wb.composite_series(&spec, "nope", Market::Epa),
            Err(QueryError::UnknownIndex("nope".into()))
        );
        assert!(matches!(
            wb.composite_series(&spec, "epa_efficiency", Market::Sports),
            Err(QueryError::MarketMismatch { .. })
        ));
    }

    #[test]
    fn test_composite_null_when_component_missing() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019);
        let series = wb.composite_series(&spec, "epa_efficiency", Market::Epa).unwrap();
        assert_eq!(series.len(), 2);
        assert!((series[0].1.unwrap() - (30.0 + 10_000.0 / 300.0)).abs() < 1e-9);
        assert_eq!(series[1], (2019, None));
    }

    #[test]
    fn test_comparison_indices_respects_active_set() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019).with_active_indices(["power"]);
        let out = wb.comparison_indices(&spec).unwrap();
        let markets: Vec<Market> = out.iter().map(|c| c.market).collect();
        assert_eq!(markets, vec![Market::Sports, Market::Epa]);
        assert!(out.iter().all(|c| c.index == "power" && c.normalized.is_some()));

        let unknown = FilterSpec::years(2018, 2019).with_active_indices(["speed"]);
        assert_eq!(
            wb.comparison_indices(&unknown),
            Err(QueryError::UnknownIndex("speed".into()))
        );
    }

    #[test]
    fn test_empty_filter_is_error_for_aggregates() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019).with_manufacturers(["Lotus"]);
        assert_eq!(wb.filtered(&spec).unwrap().len(), 0);
        assert_eq!(
            wb.yearly_aggregates(&spec, &[Metric::Horsepower]),
            Err(QueryError::EmptyResult)
        );
        assert_eq!(wb.electric_share(&spec), Err(QueryError::EmptyResult));
    }

    #[test]
    fn test_min_max_series_spans_zero_to_hundred() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019);
        let points = wb.min_max_series(&spec, Market::Sports, Metric::Horsepower).unwrap();
        let values: Vec<(i32, Option<f64>)> = points.iter().map(|p| (p.year, p.value)).collect();
        assert_eq!(values, vec![(2018, Some(0.0)), (2019, Some(100.0))]);

        let flat = FilterSpec::years(2019, 2019);
        assert!(matches!(
            wb.min_max_series(&flat, Market::Sports, Metric::Horsepower),
            Err(QueryError::NotNormalizable { .. })
        ));
        assert_eq!(
            wb.min_max_series(&spec.with_manufacturers(["Lotus"]), Market::Sports, Metric::Horsepower),
            Err(QueryError::EmptyResult)
        );
    }

    #[test]
    fn test_segment_indices_point_into_workbench_records() {
        let mut records = vec![
            epa(2010, "Honda", 140.0, 30.0, Some(300.0)),
            epa(2011, "Honda", 145.0, 31.0, Some(290.0)),
        ];
        for i in 0..9 {
            let d = i as f64;
            records.push(sports(2018 + i % 3, "Porsche", 380.0 + 40.0 * d, 4.2 - 0.1 * d, 90_000.0 + 5_000.0 * d));
            records.push(epa(2018 + i % 3, "Toyota", 150.0 + 5.0 * d, 25.0 + d, Some(350.0 - 5.0 * d)));
        }
        let wb = Workbench::from_records(records, AnalysisConfig::default());

        let seg = wb.segment_with_k(&FilterSpec::years(2018, 2020), 3).unwrap();
        assert_eq!(seg.assignments.len(), 18);
        for a in &seg.assignments {
            let rec = &wb.records()[a.record_index];
            assert!(a.record_index >= 2);
            assert_eq!(rec.year, a.year);
            assert_eq!(rec.market, a.market);
            assert_eq!(rec.manufacturer, a.manufacturer);
        }
    }

    #[test]
    fn test_segment_needs_enough_records() {
        let wb = bench();
        let spec = FilterSpec::years(2018, 2019).with_manufacturers(["porsche"]);
        assert_eq!(
            wb.segment_with_k(&spec, 3),
            Err(QueryError::InsufficientData { needed: 3, available: 2 })
        );
        assert_eq!(
            wb.segment_with_k(&FilterSpec::years(2018, 2019), 7),
            Err(QueryError::InvalidClusterCount(7))
        );
    }
}
