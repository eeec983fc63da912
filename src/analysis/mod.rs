//! Analysis layer: everything computed from filtered records.
//!
//! Architecture:
//! ```text
//!   filtered records
//!        │
//!        ├───────────────────────┐
//!        ▼                       ▼
//!   ┌───────────┐          ┌───────────┐
//!   │ aggregate │          │  segment  │  standardize → PCA → k-means
//!   └───────────┘          └───────────┘
//!        │  YearlyAggregate        │  ClusterAssignment + 2-D coords
//!        ▼
//!   ┌───────────┐
//!   │   index   │  base-year normalization, composite scores
//!   └───────────┘
//! ```
pub mod aggregate;
pub mod index;
pub mod segment;
