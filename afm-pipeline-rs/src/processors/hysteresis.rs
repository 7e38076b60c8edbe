//! Contact point, turnaround point and hysteresis area of a fitted curve.

use thiserror::Error;

use crate::config::FitConfig;
use crate::core::curve::ForceCurve;
use crate::core::writers::SummaryRow;
use crate::processors::fitting::{ContactFrame, FitError, HertzResult, TingResult};

/// Errors raised while analysing a fitted curve.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Frame(#[from] FitError),

    #[error("No samples between contact ({contact:.3} nm) and turnaround ({turnaround:.3} nm)")]
    EmptyWindow { contact: f64, turnaround: f64 },
}

/// Result type for curve analysis.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Least squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Indentation (nm) and force (pN) samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurvePart {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl CurvePart {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn from_indices(x: &[f64], y: &[f64], idx: &[usize]) -> Self {
        Self {
            x: idx.iter().map(|&i| x[i]).collect(),
            y: idx.iter().map(|&i| y[i]).collect(),
        }
    }
}

/// Summary quantities and plot data of one curve.
#[derive(Debug, Clone)]
pub struct CurveAnalysis {
    pub file_name: String,
    /// Hertz contact point (nm), measured from the indentation at the Ting
    /// contact time like every other x value.
    pub contact_point: f64,
    /// Maximum indentation (nm).
    pub turnaround_point: f64,
    /// Signed area enclosed between contact and turnaround (pN*nm).
    pub area: f64,
    /// Whole downsampled curve relative to the Ting contact.
    pub curve: CurvePart,
    /// Samples between contact and turnaround.
    pub window: CurvePart,
    pub going: CurvePart,
    pub returning: CurvePart,
    pub going_fit: Option<LinearFit>,
    pub returning_fit: Option<LinearFit>,
}

impl CurveAnalysis {
    pub fn summary_row(&self) -> SummaryRow {
        SummaryRow {
            file_name: self.file_name.clone(),
            contact_point: self.contact_point,
            turnaround_point: self.turnaround_point,
            area: self.area,
            going_slope: self.going_fit.map(|f| f.slope),
            returning_slope: self.returning_fit.map(|f| f.slope),
        }
    }
}

/// Index of the first maximum, ignoring NaN.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the value closest to `target` (first one on ties).
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| {
            let dist = (v - target).abs();
            match best {
                Some((_, b)) if b <= dist => best,
                _ => Some((i, dist)),
            }
        })
        .map(|(i, _)| i)
}

/// Indices `0, f, 2f, ...` with `f = len / pts`, at least 1.
pub fn downsample_indices(len: usize, pts: usize) -> Vec<usize> {
    let factor = (len / pts.max(1)).max(1);
    (0..len).step_by(factor).collect()
}

/// Signed trapezoidal integral of `y` over `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// Degree-1 least squares fit; `None` without two distinct `x`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let x_mean = x[..n].iter().sum::<f64>() / n as f64;
    let y_mean = y[..n].iter().sum::<f64>() / n as f64;
    let sxx: f64 = x[..n].iter().map(|v| (v - x_mean).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = x[..n]
        .iter()
        .zip(&y[..n])
        .map(|(a, b)| (a - x_mean) * (b - y_mean))
        .sum();
    let slope = sxy / sxx;
    Some(LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
    })
}

/// Derive the summary quantities of a fitted curve.
///
/// The curve is taken in contact coordinates (see [`ContactFrame`]) built
/// with the same `contact_offset` as the Ting fit, downsampled to about
/// `pts_downsample` samples and expressed in nm relative to the indentation
/// `d0` at the Ting contact time. The Hertz contact point is shifted by the
/// same `d0`. The window between contact and turnaround is split at the
/// first turnaround sample into a going and a returning part.
pub fn analyze_curve(
    curve: &ForceCurve,
    ting: &TingResult,
    hertz: &HertzResult,
    cfg: &FitConfig,
) -> Result<CurveAnalysis> {
    let frame = ContactFrame::from_curve(curve, cfg.contact_offset)?.downsample(cfg.pts_downsample);
    if frame.is_empty() {
        return Err(FitError::NotEnoughData { needed: 1, got: 0 }.into());
    }

    let i0 = nearest_index(&frame.time, ting.tc).unwrap_or(0);
    let d0 = frame.indentation[i0];

    let x: Vec<f64> = frame.indentation.iter().map(|d| (d - d0) * 1e9).collect();
    let y: Vec<f64> = frame.force.iter().map(|f| f * 1e12).collect();

    let turnaround = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let contact = (hertz.delta0 - d0) * 1e9;

    let window_idx: Vec<usize> = (0..x.len()).filter(|&i| x[i] >= contact && x[i] <= turnaround).collect();
    if window_idx.is_empty() {
        return Err(AnalysisError::EmptyWindow { contact, turnaround });
    }
    let window = CurvePart::from_indices(&x, &y, &window_idx);

    let split = window.x.iter().position(|&v| v == turnaround).unwrap_or(window.len() - 1);
    let going = CurvePart {
        x: window.x[..=split].to_vec(),
        y: window.y[..=split].to_vec(),
    };
    let returning = CurvePart {
        x: window.x[split..].to_vec(),
        y: window.y[split..].to_vec(),
    };

    let area = trapezoid(&window.x, &window.y);
    let going_fit = linear_fit(&going.x, &going.y);
    let returning_fit = linear_fit(&returning.x, &returning.y);

    log::debug!(
        "curve {}: contact {:.2} nm, turnaround {:.2} nm, area {:.4e} pN*nm",
        curve.index,
        contact,
        turnaround,
        area
    );

    Ok(CurveAnalysis {
        file_name: String::new(),
        contact_point: contact,
        turnaround_point: turnaround,
        area,
        curve: CurvePart { x, y },
        window,
        going,
        returning,
        going_fit,
        returning_fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContactModel;
    use crate::core::curve::{Segment, SegmentKind};
    use crate::processors::fitting::{ContactGeometry, FitReport};

    fn report() -> FitReport {
        FitReport {
            params: vec![],
            cost: 0.0,
            rms: 0.0,
            r_squared: 1.0,
            iterations: 0,
            converged: true,
        }
    }

    fn geometry() -> ContactGeometry {
        ContactGeometry::from_config(&FitConfig::default())
    }

    fn hertz(delta0: f64) -> HertzResult {
        HertzResult {
            e0: 1000.0,
            delta0,
            f0: 0.0,
            slope: 0.0,
            geometry: geometry(),
            fit_line: false,
            report: report(),
        }
    }

    fn ting(tc: f64) -> TingResult {
        TingResult {
            e0: 1000.0,
            tc,
            beta: 0.2,
            f0: 0.0,
            t0: 1.0,
            vdrag: 0.0,
            geometry: ContactGeometry::new(ContactModel::Paraboloid, 5e-6, 0.5),
            report: report(),
        }
    }

    /// Converted curve: indentation -0.5..1 um and back. In contact the force
    /// is 2 nN/um on the way in and 1 nN/um + 1 nN on the way out.
    fn ind_at(i: usize) -> f64 {
        -0.5e-6 + i as f64 * 0.05e-6
    }

    fn converted_curve() -> ForceCurve {
        let n = 31;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let ext_ind: Vec<f64> = (0..n).map(ind_at).collect();
        let ret_ind: Vec<f64> = ext_ind.iter().rev().copied().collect();
        let ext_force: Vec<f64> = ext_ind.iter().map(|d| 2e-3 * d.max(0.0)).collect();
        let ret_force: Vec<f64> = ret_ind
            .iter()
            .map(|d| if *d >= 0.0 { 1e-3 * d + 1e-9 } else { 0.0 })
            .collect();

        let segment = |kind, ind: Vec<f64>, force: Vec<f64>| {
            let mut s = Segment::new(kind, time.clone(), vec![0.0; n], vec![0.0; n]);
            s.deflection = vec![0.0; n];
            s.indentation = ind;
            s.force = force;
            s
        };
        ForceCurve::new(
            0,
            vec![
                segment(SegmentKind::Extend, ext_ind, ext_force),
                segment(SegmentKind::Retract, ret_ind, ret_force),
            ],
        )
    }

    #[test]
    fn test_argmax_and_nearest() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
        assert_eq!(nearest_index(&[0.0, 1.0, 2.0], 1.4), Some(1));
        assert_eq!(nearest_index(&[0.0, 1.0, 2.0], 1.5), Some(1));
    }

    #[test]
    fn test_downsample_indices() {
        assert_eq!(downsample_indices(10, 3), vec![0, 3, 6, 9]);
        assert_eq!(downsample_indices(5, 300), vec![0, 1, 2, 3, 4]);
        assert!(downsample_indices(0, 10).is_empty());
    }

    #[test]
    fn test_trapezoid_signed() {
        assert_eq!(trapezoid(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]), 2.0);
        // out and back along the same path encloses nothing
        assert_eq!(trapezoid(&[0.0, 1.0, 0.0], &[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_linear_fit() {
        let fit = linear_fit(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.eval(3.0) - 7.0).abs() < 1e-12);

        assert!(linear_fit(&[1.0], &[1.0]).is_none());
        assert!(linear_fit(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_analyze_curve_hysteresis() {
        let curve = converted_curve();
        let cfg = FitConfig::default();

        // contact at the zero-indentation sample, which is t = 0 in the frame
        let analysis = analyze_curve(&curve, &ting(0.0), &hertz(ind_at(10)), &cfg).unwrap();

        assert!((analysis.turnaround_point - 1000.0).abs() < 1e-6);
        assert_eq!(analysis.contact_point, 0.0);

        let going = analysis.going_fit.unwrap();
        let returning = analysis.returning_fit.unwrap();
        // 2 nN/um = 2 pN/nm on the way in, 1 pN/nm on the way out
        assert!((going.slope - 2.0).abs() < 1e-9);
        assert!((returning.slope - 1.0).abs() < 1e-9);

        // going adds 1e6 pN*nm, returning takes back 1.5e6
        assert!((analysis.area + 5e5).abs() < 1.0, "area {}", analysis.area);

        assert_eq!(analysis.going.x.last(), analysis.returning.x.first());
        let row = analysis.summary_row();
        assert_eq!(row.going_slope, Some(going.slope));
    }

    #[test]
    fn test_contact_point_shares_frame_with_curve() {
        let curve = converted_curve();
        let cfg = FitConfig::default();

        // both models put contact 250 nm into the sample, at t = 0.5 s
        let analysis = analyze_curve(&curve, &ting(0.5), &hertz(ind_at(15)), &cfg).unwrap();

        assert!(analysis.contact_point.abs() < 1e-6, "contact {}", analysis.contact_point);
        assert!(analysis.window.x[0].abs() < 1e-6, "window starts at {}", analysis.window.x[0]);
        assert!((analysis.turnaround_point - 750.0).abs() < 1e-6);
        assert_eq!(analysis.going.len(), 16);
        assert!((analysis.going_fit.unwrap().slope - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_curve_empty_window() {
        let curve = converted_curve();
        let cfg = FitConfig::default();
        let result = analyze_curve(&curve, &ting(0.0), &hertz(5e-6), &cfg);
        assert!(matches!(result, Err(AnalysisError::EmptyWindow { .. })));
    }
}
