//! Diagnostic plots for analysed force curves.
//!
//! Each analysed file gets a force-indentation plot with the going and
//! returning branches, the fitted line and the hysteresis area. Each folder
//! gets an overlay of all its curves with their average.

use std::ops::Range;
use std::path::Path;

use log::warn;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::OutputConfig;
use crate::processors::hysteresis::{CurveAnalysis, CurvePart, LinearFit};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Nothing to plot")]
    EmptyCurve,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

const GOING_COLOR: RGBColor = RGBColor(0x59, 0x9c, 0xff);
const RETURNING_COLOR: RGBColor = RGBColor(0xed, 0x6b, 0x7a);
const AREA_COLOR: RGBColor = RGBColor(173, 216, 230);
const MARKER_COLOR: RGBColor = RGBColor(0, 128, 0);

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Padded `min..max` over all finite values.
fn axis_range<'a, I>(values: I) -> Range<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (mut lo, mut hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

/// Legend text of a fitted line.
fn fit_label(fit: &LinearFit) -> String {
    format!("Line of best fit: y = {:.2}x + {:.2}", fit.slope, fit.intercept)
}

/// Endpoints of the going fit, from the first going sample to the turnaround.
fn fit_segment(fit: &LinearFit, going: &CurvePart, turnaround: f64) -> Option<[(f64, f64); 2]> {
    let start = going.x.iter().copied().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
    if !start.is_finite() || !turnaround.is_finite() {
        return None;
    }
    Some([(start, fit.eval(start)), (turnaround, fit.eval(turnaround))])
}

fn points(part: &CurvePart) -> impl Iterator<Item = (f64, f64)> + '_ {
    part.x.iter().copied().zip(part.y.iter().copied())
}

/// Run `draw` with text, and again without captions, axis labels and
/// legends if text rendering fails (no usable system font).
fn draw_with_text_fallback<F>(output_path: &Path, draw: F) -> Result<()>
where
    F: Fn(bool) -> Result<()>,
{
    match draw(true) {
        Err(VisualizationError::PlottingError(e)) => {
            warn!("Drawing {} without text: {}", output_path.display(), e);
            draw(false)
        }
        other => other,
    }
}

/// Force-indentation plot of one analysed curve.
pub fn plot_curve_analysis(output_path: &Path, analysis: &CurveAnalysis, cfg: &OutputConfig) -> Result<()> {
    if analysis.curve.is_empty() {
        return Err(VisualizationError::EmptyCurve);
    }
    draw_with_text_fallback(output_path, |text| draw_curve_analysis(output_path, analysis, cfg, text))
}

fn draw_curve_analysis(output_path: &Path, analysis: &CurveAnalysis, cfg: &OutputConfig, text: bool) -> Result<()> {
    let x_range = axis_range(analysis.curve.x.iter().chain([analysis.contact_point, analysis.turnaround_point].iter()));
    let y_range = axis_range(analysis.curve.y.iter().chain(std::iter::once(&0.0)));

    let root = BitMapBackend::new(output_path, (cfg.plot_width, cfg.plot_height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if text {
        builder
            .caption(&analysis.file_name, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60);
    }
    let mut chart = builder
        .build_cartesian_2d(x_range, y_range.clone())
        .map_err(plot_err)?;

    if text {
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_desc("Indentation [nm]")
            .y_desc("Force [pN]")
            .draw()
            .map_err(plot_err)?;
    }

    chart
        .draw_series(AreaSeries::new(points(&analysis.window), 0.0, AREA_COLOR.mix(0.5)))
        .map_err(plot_err)?
        .label("Area")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], AREA_COLOR.filled()));

    chart
        .draw_series(LineSeries::new(points(&analysis.curve), BLACK.stroke_width(3)))
        .map_err(plot_err)?
        .label("Experimental Data")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(3)));

    chart
        .draw_series(LineSeries::new(points(&analysis.going), GOING_COLOR.stroke_width(3)))
        .map_err(plot_err)?
        .label("Going Curve")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GOING_COLOR.stroke_width(3)));

    if let Some(fit) = &analysis.going_fit {
        if let Some(segment) = fit_segment(fit, &analysis.going, analysis.turnaround_point) {
            chart
                .draw_series(LineSeries::new(segment, RED.stroke_width(2)))
                .map_err(plot_err)?
                .label(fit_label(fit))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));
        }
    }

    chart
        .draw_series(LineSeries::new(points(&analysis.returning), RETURNING_COLOR.stroke_width(3)))
        .map_err(plot_err)?
        .label("Returning Curve")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RETURNING_COLOR.stroke_width(3)));

    for (x, name) in [(analysis.contact_point, "Contact Point"), (analysis.turnaround_point, "Turn Point")] {
        chart
            .draw_series(DashedLineSeries::new(
                [(x, y_range.start), (x, y_range.end)],
                8,
                6,
                MARKER_COLOR.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(name)
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], MARKER_COLOR.stroke_width(2)));
    }

    if text {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Overlay of every curve of a folder with their average.
pub fn plot_folder_curves(
    output_path: &Path,
    title: &str,
    curves: &[&CurvePart],
    average: Option<&CurvePart>,
    cfg: &OutputConfig,
) -> Result<()> {
    if curves.iter().all(|c| c.is_empty()) {
        return Err(VisualizationError::EmptyCurve);
    }
    draw_with_text_fallback(output_path, |text| {
        draw_folder_curves(output_path, title, curves, average, cfg, text)
    })
}

fn draw_folder_curves(
    output_path: &Path,
    title: &str,
    curves: &[&CurvePart],
    average: Option<&CurvePart>,
    cfg: &OutputConfig,
    text: bool,
) -> Result<()> {
    let x_range = axis_range(curves.iter().flat_map(|c| c.x.iter()));
    let y_range = axis_range(curves.iter().flat_map(|c| c.y.iter()));

    let root = BitMapBackend::new(output_path, (cfg.plot_width, cfg.plot_height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if text {
        builder
            .caption(title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60);
    }
    let mut chart = builder.build_cartesian_2d(x_range, y_range).map_err(plot_err)?;

    if text {
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_desc("Indentation [nm]")
            .y_desc("Force [pN]")
            .draw()
            .map_err(plot_err)?;
    }

    for curve in curves {
        chart
            .draw_series(LineSeries::new(points(curve), BLACK.mix(0.1).stroke_width(1)))
            .map_err(plot_err)?;
    }

    if let Some(avg) = average {
        chart
            .draw_series(LineSeries::new(points(avg), RED.stroke_width(3)))
            .map_err(plot_err)?
            .label("Average")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(3)));

        if text {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(plot_err)?;
        }
    }

    root.present().map_err(plot_err)?;
    Ok(())
}
