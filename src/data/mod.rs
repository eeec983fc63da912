//! Data layer: raw tables, cleaning, and filtering.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader  │  parse file → RawTable (loosely typed cells)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  clean   │  validate rows → Vec<VehicleRecord> + CleaningReport
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter  │  apply FilterSpec → matching records, input order kept
//!   └──────────┘
//! ```
pub mod clean;
pub mod filter;
pub mod loader;
pub mod model;
