//! # Vehicle Trends
//!
//! Analytics core comparing a sports-car performance table with the EPA
//! fuel-economy table on a common model-year axis.
//!
//! ## Pipeline
//!
//! ```text
//! raw files ─▶ loader ─▶ RawTable ─▶ Cleaner ─▶ VehicleRecord
//!                                                   │
//!                                     FilterSpec ─▶ filter
//!                                                   │
//!                       ┌───────────────────────────┼───────────────┐
//!                       ▼                           ▼               ▼
//!                   aggregate ─▶ index          segment       electric share
//! ```
//!
//! Every query is a pure function of the cleaned records, an explicit
//! [`FilterSpec`] and the [`AnalysisConfig`]; [`Workbench`] bundles the
//! first and last and exposes the queries.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod workbench;

pub use analysis::aggregate::{ElectricShare, MetricSummary, YearlyAggregate};
pub use analysis::index::{CompositeIndex, IndexSeries, Inversion};
pub use analysis::segment::{ClusterAssignment, Feature, Segmentation};
pub use config::{AnalysisConfig, ClusterSpace, SegmentationConfig, YearRange};
pub use data::filter::FilterSpec;
pub use data::model::{FuelCategory, GroupKey, Market, Metric, VehicleRecord};
pub use error::{QueryError, ValidationError};
pub use workbench::Workbench;
