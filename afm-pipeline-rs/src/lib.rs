//! Batch analysis of AFM force-indentation curves.
//!
//! This crate provides tools for:
//! - Reading JPK force, force map and QI archives
//! - Contact point detection and force/indentation conversion
//! - Hertz (elastic) and Ting (viscoelastic) contact model fits
//! - Contact point, turnaround point and hysteresis area per curve
//! - Per-curve and per-folder plots and a summary CSV
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use afm_pipeline::{processors::batch::run_batch, AnalysisConfig};
//!
//! let report = run_batch(Path::new("measurements"), &AnalysisConfig::default(), None).unwrap();
//! for analysis in &report.analyses {
//!     println!("{}: {:.1} pN*nm", analysis.file_name, analysis.area);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

#[cfg(test)]
mod fixtures;

pub use config::{AnalysisConfig, FitConfig, OutputConfig, ProcessingConfig};
pub use core::curve::{ForceCurve, Segment, SegmentKind};
pub use core::loaders::{FileMetadata, FileType, JpkArchive};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
