//! Data layer: the spectrum entity, its reduction, persistence and export.
//!
//! Architecture:
//! ```text
//!  accumulated frames / .png / .jpg / .json
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  raw array ↔ file, whole Spectrum ↔ JSON blob
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  model    │  Spectrum: raw + original data, metadata, arithmetic
//!   └──────────┘
//!        │  process(threshold)
//!        ▼
//!   ┌──────────┐
//!   │  reduce   │  ROI → grayscale → threshold mask → column sums
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  export   │  spectrum1d → .csv / .xy / .dat / .parquet
//!   └──────────┘
//! ```

pub mod export;
pub mod loader;
pub mod model;
pub mod reduce;
