//! CSV writers for analysis results.
//!
//! - Summary CSV with one row per analysed file
//! - Per-curve CSV with the plotted indentation/force pairs

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

/// Column names of the summary file.
pub const SUMMARY_HEADER: [&str; 6] = [
    "Filename",
    "Contact Point",
    "Turnaround Point",
    "Area Curve",
    "Going Slope",
    "Returning Slope",
];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("array length mismatch: indentation has {x_len} elements, force has {y_len} elements")]
    LengthMismatch { x_len: usize, y_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// One line of the summary CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub file_name: String,
    /// Contact point in nm.
    pub contact_point: f64,
    /// Maximum indentation in nm.
    pub turnaround_point: f64,
    /// Hysteresis area in pN*nm.
    pub area: f64,
    pub going_slope: Option<f64>,
    pub returning_slope: Option<f64>,
}

impl SummaryRow {
    fn record(&self) -> [String; 6] {
        let optional = |v: Option<f64>| v.map(|s| s.to_string()).unwrap_or_default();
        [
            self.file_name.clone(),
            self.contact_point.to_string(),
            self.turnaround_point.to_string(),
            self.area.to_string(),
            optional(self.going_slope),
            optional(self.returning_slope),
        ]
    }
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

/// Write the per-file summary table.
///
/// Rows are written in the given order. Slopes are left blank when the
/// corresponding sub-curve could not be fitted.
///
/// # Example
///
/// ```no_run
/// use afm_pipeline::core::writers::{write_summary_csv, SummaryRow};
/// use std::path::Path;
///
/// let rows = vec![SummaryRow {
///     file_name: "cell1.jpk-force-map".to_string(),
///     contact_point: 120.0,
///     turnaround_point: 950.0,
///     area: 1.2e5,
///     going_slope: Some(3.1),
///     returning_slope: None,
/// }];
/// write_summary_csv(Path::new("summary.csv"), &rows).unwrap();
/// ```
pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    csv_writer
        .write_record(SUMMARY_HEADER)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for row in rows {
        csv_writer
            .write_record(&row.record())
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write the indentation (nm) and force (pN) pairs of one curve.
pub fn write_curve_csv(path: &Path, indentation_nm: &[f64], force_pn: &[f64]) -> Result<()> {
    if indentation_nm.len() != force_pn.len() {
        return Err(WriteError::LengthMismatch {
            x_len: indentation_nm.len(),
            y_len: force_pn.len(),
        });
    }

    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["indentation_nm", "force_pn"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (x, y) in indentation_nm.iter().zip(force_pn) {
        csv_writer
            .write_record(&[format!("{:.6}", x), format!("{:.6}", y)])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn row(name: &str, going: Option<f64>) -> SummaryRow {
        SummaryRow {
            file_name: name.to_string(),
            contact_point: 12.5,
            turnaround_point: 800.0,
            area: -1500.25,
            going_slope: going,
            returning_slope: Some(2.0),
        }
    }

    #[test]
    fn test_write_summary_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        write_summary_csv(&path, &[row("a.jpk-force-map", Some(1.5)), row("b.jpk-force-map", None)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(
            lines[0],
            "Filename,Contact Point,Turnaround Point,Area Curve,Going Slope,Returning Slope"
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "a.jpk-force-map,12.5,800,-1500.25,1.5,2");
        assert_eq!(lines[2], "b.jpk-force-map,12.5,800,-1500.25,,2");
    }

    #[test]
    fn test_write_summary_csv_empty_has_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        write_summary_csv(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_write_curve_csv_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("curve.csv");

        write_curve_csv(&path, &[0.0, 1.5], &[10.0, 20.25]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "indentation_nm,force_pn");
        assert_eq!(lines[2], "1.500000,20.250000");
    }

    #[test]
    fn test_write_curve_csv_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("curve.csv");

        match write_curve_csv(&path, &[1.0], &[1.0, 2.0]) {
            Err(WriteError::LengthMismatch { x_len, y_len }) => {
                assert_eq!(x_len, 1);
                assert_eq!(y_len, 2);
            }
            other => panic!("Expected LengthMismatch error, got {:?}", other),
        }
    }
}
