//! Core data types and I/O operations.

pub mod curve;
pub mod loaders;
pub mod properties;
pub mod writers;

pub use curve::{ForceCurve, Segment, SegmentKind};
pub use loaders::{load_file, FileMetadata, FileType, JpkArchive, LoaderError};
pub use writers::{write_curve_csv, write_summary_csv, SummaryRow, WriteError};
