//! Data processing modules.

pub mod batch;
pub mod contact;
pub mod fitting;
pub mod hysteresis;

// Re-export key types for convenience
pub use batch::{
    average_curve, find_force_files, process_file, process_folder, run_batch, BatchError, BatchReport,
    FolderBatch, FolderResult,
};
pub use contact::{find_contact_point, ContactError, ContactPoint};
pub use fitting::{do_ting_fit, ContactGeometry, FitError, HertzResult, TingResult};
pub use hysteresis::{analyze_curve, AnalysisError, CurveAnalysis, CurvePart, LinearFit};
