use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::model::{FuelCategory, GroupKey, Market, Metric, VehicleRecord};
use crate::error::QueryError;

/// Summary of one metric over the records of a group.
///
/// `mean`/`min`/`max` are `None` when no contributing record had the metric;
/// `non_null` counts the records that did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub non_null: usize,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    n: usize,
}

impl Accumulator {
    fn push(&mut self, v: f64) {
        if self.n == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v;
        self.n += 1;
    }

    fn finish(&self) -> MetricSummary {
        if self.n == 0 {
            return MetricSummary { mean: None, min: None, max: None, non_null: 0 };
        }
        MetricSummary {
            mean: Some(self.sum / self.n as f64),
            min: Some(self.min),
            max: Some(self.max),
            non_null: self.n,
        }
    }
}

/// Yearly statistics for one `(market, year, group)` cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyAggregate {
    pub market: Market,
    pub year: i32,
    pub group: Option<String>,
    /// Records in the cell; always ≥ 1.
    pub count: usize,
    pub metrics: BTreeMap<Metric, MetricSummary>,
}

impl YearlyAggregate {
    pub fn summary(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.get(&metric)
    }

    /// Mean of `metric`, `None` if not requested or absent in every record.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).and_then(|s| s.mean)
    }
}

/// Group records by `(year, market, group)` and summarise `metrics`.
///
/// Output is ordered by year, then market, then group. Cells only exist for
/// combinations that actually occur, so every `count` is at least 1. Empty
/// input is an [`QueryError::EmptyResult`].
pub fn aggregate(
    records: &[&VehicleRecord],
    metrics: &[Metric],
    group_by: Option<GroupKey>,
) -> Result<Vec<YearlyAggregate>, QueryError> {
    if records.is_empty() {
        return Err(QueryError::EmptyResult);
    }

    type Key = (i32, Market, Option<String>);
    let mut cells: BTreeMap<Key, (usize, Vec<Accumulator>)> = BTreeMap::new();

    for rec in records {
        let key = (rec.year, rec.market, group_by.map(|g| g.value_of(rec)));
        let (count, accs) = cells
            .entry(key)
            .or_insert_with(|| (0, metrics.iter().map(|_| Accumulator::default()).collect()));
        *count += 1;
        for (acc, metric) in accs.iter_mut().zip(metrics) {
            if let Some(v) = metric.value(rec) {
                acc.push(v);
            }
        }
    }

    Ok(cells
        .into_iter()
        .map(|((year, market, group), (count, accs))| YearlyAggregate {
            market,
            year,
            group,
            count,
            metrics: metrics
                .iter()
                .copied()
                .zip(accs.iter().map(Accumulator::finish))
                .collect(),
        })
        .collect())
}

/// Pull one `(year, mean)` series out of an aggregate table.
pub fn metric_series(
    aggregates: &[YearlyAggregate],
    market: Market,
    group: Option<&str>,
    metric: Metric,
) -> Vec<(i32, Option<f64>)> {
    aggregates
        .iter()
        .filter(|a| a.market == market && a.group.as_deref() == group)
        .map(|a| (a.year, a.mean(metric)))
        .collect()
}

/// Electric vehicles per year, with their share of the year's records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectricShare {
    pub market: Market,
    pub year: i32,
    pub total: usize,
    pub electric: usize,
    pub share: f64,
}

pub fn electric_share(records: &[&VehicleRecord]) -> Result<Vec<ElectricShare>, QueryError> {
    if records.is_empty() {
        return Err(QueryError::EmptyResult);
    }
    let mut counts: BTreeMap<(i32, Market), (usize, usize)> = BTreeMap::new();
    for rec in records {
        let (total, electric) = counts.entry((rec.year, rec.market)).or_default();
        *total += 1;
        if rec.fuel_type_category == FuelCategory::Electric {
            *electric += 1;
        }
    }
    Ok(counts
        .into_iter()
        .map(|((year, market), (total, electric))| ElectricShare {
            market,
            year,
            total,
            electric,
            share: electric as f64 / total as f64,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(market: Market, year: i32, make: &str, hp: Option<f64>, mpg: Option<f64>) -> VehicleRecord {
        VehicleRecord {
            market,
            year,
            manufacturer: make.to_string(),
            model: None,
            horsepower: hp,
            engine_displacement_l: None,
            price_usd: if market == Market::Sports { Some(90_000.0) } else { None },
            accel_0_60_s: None,
            combined_mpg: mpg,
            co2_g_per_mi: None,
            fuel_type_category: FuelCategory::Gasoline,
        }
    }

    #[test]
    fn test_mean_ignores_nulls() {
        let records = vec![
            rec(Market::Epa, 2020, "Honda", Some(100.0), Some(30.0)),
            rec(Market::Epa, 2020, "Honda", None, Some(40.0)),
            rec(Market::Epa, 2020, "Kia", Some(200.0), None),
        ];
        let refs: Vec<&VehicleRecord> = records.iter().collect();
        let out = aggregate(&refs, &[Metric::Horsepower, Metric::CombinedMpg], None).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].count, 3);
        let hp = out[0].summary(Metric::Horsepower).unwrap();
        assert_eq!(hp.mean, Some(150.0));
        assert_eq!(hp.non_null, 2);
        assert_eq!(hp.min, Some(100.0));
        assert_eq!(hp.max, Some(200.0));
        assert_eq!(out[0].mean(Metric::CombinedMpg), Some(35.0));
    }

    #[test]
    fn test_cross_market_metric_is_null_not_zero() {
        let records = vec![
            rec(Market::Sports, 2020, "Porsche", Some(400.0), None),
            rec(Market::Epa, 2020, "Honda", Some(150.0), Some(30.0)),
        ];
        let refs: Vec<&VehicleRecord> = records.iter().collect();
        let out = aggregate(&refs, &[Metric::CombinedMpg, Metric::PriceUsd], None).unwrap();

        assert_eq!(out.len(), 2);
        let sports = out.iter().find(|a| a.market == Market::Sports).unwrap();
        let epa = out.iter().find(|a| a.market == Market::Epa).unwrap();
        assert_eq!(sports.mean(Metric::CombinedMpg), None);
        assert_eq!(sports.summary(Metric::CombinedMpg).unwrap().non_null, 0);
        assert_eq!(sports.mean(Metric::PriceUsd), Some(90_000.0));
        assert_eq!(epa.mean(Metric::PriceUsd), None);
        assert_eq!(epa.mean(Metric::CombinedMpg), Some(30.0));
    }

    #[test]
    fn test_grouping_and_order() {
        let records = vec![
            rec(Market::Epa, 2021, "Kia", Some(150.0), None),
            rec(Market::Epa, 2019, "Kia", Some(140.0), None),
            rec(Market::Epa, 2019, "Honda", Some(160.0), None),
            rec(Market::Epa, 2021, "Kia", Some(170.0), None),
        ];
        let refs: Vec<&VehicleRecord> = records.iter().collect();
        let out = aggregate(&refs, &[Metric::Horsepower], Some(GroupKey::Manufacturer)).unwrap();

        let keys: Vec<(i32, Option<&str>, usize)> = out
            .iter()
            .map(|a| (a.year, a.group.as_deref(), a.count))
            .collect();
        assert_eq!(
            keys,
            vec![(2019, Some("honda"), 1), (2019, Some("kia"), 1), (2021, Some("kia"), 2)]
        );
        assert_eq!(out[2].mean(Metric::Horsepower), Some(160.0));

        let kia = metric_series(&out, Market::Epa, Some("kia"), Metric::Horsepower);
        assert_eq!(kia, vec![(2019, Some(140.0)), (2021, Some(160.0))]);
    }

    #[test]
    fn test_manufacturer_groups_merge_spellings() {
        let records = vec![
            rec(Market::Sports, 2020, "Porsche", Some(400.0), None),
            rec(Market::Sports, 2020, "porsche", Some(500.0), None),
            rec(Market::Sports, 2020, "PORSCHE ", Some(600.0), None),
        ];
        let refs: Vec<&VehicleRecord> = records.iter().collect();
        let out = aggregate(&refs, &[Metric::Horsepower], Some(GroupKey::Manufacturer)).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].group.as_deref(), Some("porsche"));
        assert_eq!(out[0].count, 3);
        assert_eq!(out[0].mean(Metric::Horsepower), Some(500.0));
    }

    #[test]
    fn test_empty_input_is_error() {
        assert_eq!(aggregate(&[], &[Metric::Horsepower], None), Err(QueryError::EmptyResult));
    }

    #[test]
    fn test_electric_share() {
        let mut ev = rec(Market::Epa, 2020, "Nissan", Some(147.0), Some(111.0));
        ev.fuel_type_category = FuelCategory::Electric;
        let records = vec![ev, rec(Market::Epa, 2020, "Honda", Some(150.0), Some(30.0))];
        let refs: Vec<&VehicleRecord> = records.iter().collect();
        let out = electric_share(&refs).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].electric, 1);
        assert_eq!(out[0].total, 2);
        assert!((out[0].share - 0.5).abs() < 1e-12);
    }
}
