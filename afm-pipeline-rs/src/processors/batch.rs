//! Directory traversal and per-folder batch analysis.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::core::loaders;
use crate::core::writers::write_curve_csv;
use crate::processors::fitting::do_ting_fit;
use crate::processors::hysteresis::{analyze_curve, CurveAnalysis, CurvePart};
use crate::visualization;

/// Errors raised while walking the input tree.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Force files found directly inside one folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderBatch {
    pub folder: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Outcome of one folder.
#[derive(Debug)]
pub struct FolderResult {
    pub folder: PathBuf,
    pub analyses: Vec<CurveAnalysis>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Outcome of a whole run, in traversal order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub analyses: Vec<CurveAnalysis>,
    pub failures: Vec<(PathBuf, String)>,
    /// Folders that contained at least one force file.
    pub folders: usize,
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| name.ends_with(&format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase())))
}

/// Collect force files under `dir`, grouped per folder.
///
/// A folder comes before its subfolders and entries are visited in name
/// order. Folders without matching files are left out. Symlinked folders
/// are not followed, and subfolders that cannot be read are skipped with a
/// warning.
pub fn find_force_files(dir: &Path, extensions: &[String]) -> std::result::Result<Vec<FolderBatch>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::NotADirectory(dir.to_path_buf()));
    }
    let mut batches = Vec::new();
    walk(dir, extensions, &mut batches)?;
    Ok(batches)
}

fn walk(dir: &Path, extensions: &[String], out: &mut Vec<FolderBatch>) -> std::result::Result<(), BatchError> {
    let mut entries: Vec<(PathBuf, bool)> = fs::read_dir(dir)
        .map_err(|source| BatchError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            // file_type does not follow symlinks
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (entry.path(), is_dir)
        })
        .collect();
    entries.sort();

    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|(_, is_dir)| *is_dir);
    let files: Vec<PathBuf> = files
        .into_iter()
        .map(|(p, _)| p)
        .filter(|p| matches_extension(p, extensions))
        .collect();

    if !files.is_empty() {
        out.push(FolderBatch {
            folder: dir.to_path_buf(),
            files,
        });
    }
    for (sub, _) in dirs {
        if let Err(e) = walk(&sub, extensions, out) {
            warn!("Skipping {}: {}", sub.display(), e);
        }
    }
    Ok(())
}

/// Analyse the configured curve of one file and write its per-curve outputs.
pub fn process_file(path: &Path, cfg: &AnalysisConfig) -> Result<CurveAnalysis> {
    let mut archive =
        loaders::load_file(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let meta = archive.metadata().clone();

    let mut curve = archive
        .curve(cfg.processing.curve_index)
        .with_context(|| format!("Failed to read curve {} of {}", cfg.processing.curve_index, path.display()))?;

    let def_sens = cfg.fit.def_sens.unwrap_or_else(|| meta.defl_sens_m_by_v());
    let k = cfg.fit.k.unwrap_or(meta.spring_const_n_by_m);
    if !(def_sens.is_finite() && def_sens > 0.0) {
        anyhow::bail!("Invalid deflection sensitivity {} m/V in {}", def_sens, path.display());
    }
    if !(k.is_finite() && k > 0.0) {
        anyhow::bail!("Invalid spring constant {} N/m in {}", k, path.display());
    }

    curve.preprocess_force_curve(def_sens);
    if meta.file_type.needs_height_shift() {
        curve.shift_height();
    }

    let (ting, hertz) = do_ting_fit(&mut curve, &cfg.fit, k).with_context(|| format!("Fit failed for {}", path.display()))?;
    let mut analysis = analyze_curve(&curve, &ting, &hertz, &cfg.fit)
        .with_context(|| format!("Analysis failed for {}", path.display()))?;
    analysis.file_name = meta.file_name.clone();

    if cfg.output.curve_plots {
        let plot_path = path.with_file_name(format!("{}.png", meta.file_name));
        if let Err(e) = visualization::plot_curve_analysis(&plot_path, &analysis, &cfg.output) {
            warn!("Could not plot {}: {}", plot_path.display(), e);
        }
    }
    if cfg.output.curve_csv {
        let csv_path = path.with_file_name(format!("{}.csv", meta.file_name));
        write_curve_csv(&csv_path, &analysis.curve.x, &analysis.curve.y)
            .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    }

    debug!(
        "{}: contact {:.2} nm, turnaround {:.2} nm, area {:.4e}",
        analysis.file_name, analysis.contact_point, analysis.turnaround_point, analysis.area
    );
    Ok(analysis)
}

/// Element-wise mean of several curves, truncated to the shortest one.
pub fn average_curve(curves: &[&CurvePart]) -> Option<CurvePart> {
    let len = curves.iter().map(|c| c.x.len().min(c.y.len())).min()?;
    if len == 0 {
        return None;
    }
    let mut x = vec![0.0; len];
    let mut y = vec![0.0; len];
    for curve in curves {
        for i in 0..len {
            x[i] += curve.x[i];
            y[i] += curve.y[i];
        }
    }
    let n = curves.len() as f64;
    x.iter_mut().chain(y.iter_mut()).for_each(|v| *v /= n);
    Some(CurvePart { x, y })
}

/// Analyse every file of a folder in parallel and draw the folder plot.
///
/// Failed files are logged and reported, the rest keep their order.
pub fn process_folder(batch: &FolderBatch, cfg: &AnalysisConfig, progress: Option<&ProgressBar>) -> FolderResult {
    let results: Vec<(PathBuf, Result<CurveAnalysis>)> = batch
        .files
        .par_iter()
        .map(|path| {
            let result = process_file(path, cfg);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            (path.clone(), result)
        })
        .collect();

    let mut analyses = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (path, result) in results {
        match result {
            Ok(analysis) => analyses.push(analysis),
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                failures.push((path, format!("{:#}", e)));
            }
        }
    }

    if cfg.output.folder_plots && !analyses.is_empty() {
        let curves: Vec<&CurvePart> = analyses.iter().map(|a| &a.curve).collect();
        let average = average_curve(&curves);
        let folder_name = batch
            .folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| batch.folder.display().to_string());
        let title = format!("Force Curves for {}", folder_name);
        let plot_path = batch.folder.join(&cfg.output.combined_plot_name);

        if let Err(e) = visualization::plot_folder_curves(&plot_path, &title, &curves, average.as_ref(), &cfg.output) {
            warn!("Could not plot {}: {}", plot_path.display(), e);
        }
    }

    FolderResult {
        folder: batch.folder.clone(),
        analyses,
        failures,
    }
}

/// Walk `base_dir` and analyse every force file found.
pub fn run_batch(base_dir: &Path, cfg: &AnalysisConfig, progress: Option<&ProgressBar>) -> Result<BatchReport> {
    let batches = find_force_files(base_dir, &cfg.processing.extensions)?;
    let total: usize = batches.iter().map(|b| b.files.len()).sum();
    info!("Found {} force files in {} folders under {}", total, batches.len(), base_dir.display());

    if let Some(pb) = progress {
        pb.set_length(total as u64);
    }

    let mut report = BatchReport {
        folders: batches.len(),
        ..BatchReport::default()
    };
    for batch in &batches {
        info!("Processing {} ({} files)", batch.folder.display(), batch.files.len());
        let result = process_folder(batch, cfg, progress);
        report.analyses.extend(result.analyses);
        report.failures.extend(result.failures);
    }
    Ok(report)
}
