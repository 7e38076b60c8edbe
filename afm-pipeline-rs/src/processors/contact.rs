//! Baseline correction, contact point detection and force conversion.

use thiserror::Error;

use crate::config::{FitConfig, OffsetType, PocMethod};
use crate::core::curve::{ForceCurve, SegmentKind};

/// Errors raised while preparing a curve for fitting.
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("Curve has no extend segment")]
    NoExtendSegment,

    #[error("Curve has not been preprocessed (deflection missing)")]
    NotPreprocessed,

    #[error("Not enough points: need {needed}, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },

    #[error("Degenerate window: {0}")]
    DegenerateWindow(String),

    #[error("No contact point found")]
    NoContact,
}

/// Result type for contact operations.
pub type Result<T> = std::result::Result<T, ContactError>;

/// Contact point as `[height, deflection]` in metres.
pub type ContactPoint = [f64; 2];

fn extend_channels(curve: &ForceCurve) -> Result<(&[f64], &[f64])> {
    let ext = curve.extend().ok_or(ContactError::NoExtendSegment)?;
    if ext.deflection.len() != ext.len() {
        return Err(ContactError::NotPreprocessed);
    }
    Ok((&ext.zheight, &ext.deflection))
}

/// Subtract the mean baseline deflection from every segment.
///
/// Returns the subtracted offset.
pub fn correct_offset(curve: &mut ForceCurve, cfg: &FitConfig) -> Result<f64> {
    let (z, d) = extend_channels(curve)?;

    let zmin = z.iter().copied().fold(f64::INFINITY, f64::min);
    let zmax = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = match cfg.offset_type {
        OffsetType::Percentage => {
            let span = zmax - zmin;
            (zmin + cfg.min_offset * span, zmin + cfg.max_offset * span)
        }
        OffsetType::Value => (zmin + cfg.min_offset, zmin + cfg.max_offset),
    };

    let baseline: Vec<f64> = z
        .iter()
        .zip(d)
        .filter(|(zi, _)| **zi >= lo && **zi <= hi)
        .map(|(_, di)| *di)
        .collect();

    if baseline.is_empty() {
        return Err(ContactError::DegenerateWindow(format!(
            "no baseline points between {:.3e} and {:.3e} m",
            lo, hi
        )));
    }

    let offset = mean(&baseline);
    for segment in &mut curve.segments {
        for value in &mut segment.deflection {
            *value -= offset;
        }
    }
    Ok(offset)
}

/// Remove a linear baseline fitted just before the contact point.
///
/// The fit uses extend samples with heights in
/// `[poc - tilt_max_offset, poc - tilt_min_offset]`.
pub fn correct_tilt(curve: &mut ForceCurve, poc: ContactPoint, cfg: &FitConfig) -> Result<(f64, f64)> {
    let (z, d) = extend_channels(curve)?;
    let lo = poc[0] - cfg.tilt_max_offset;
    let hi = poc[0] - cfg.tilt_min_offset;

    let (xs, ys): (Vec<f64>, Vec<f64>) = z
        .iter()
        .zip(d)
        .filter(|(zi, _)| **zi >= lo && **zi <= hi)
        .map(|(zi, di)| (*zi, *di))
        .unzip();

    if xs.len() < 2 {
        return Err(ContactError::NotEnoughPoints { needed: 2, got: xs.len() });
    }

    let x_mean = mean(&xs);
    let y_mean = mean(&ys);
    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if sxx <= 0.0 {
        return Err(ContactError::DegenerateWindow("tilt region has a single height".to_string()));
    }
    let sxy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    for segment in &mut curve.segments {
        for (value, zi) in segment.deflection.iter_mut().zip(&segment.zheight) {
            *value -= slope * zi + intercept;
        }
    }
    Ok((slope, intercept))
}

/// Centred moving average; edges use the samples available.
pub fn smooth(values: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 || values.len() < 2 {
        return values.to_vec();
    }
    let half = win / 2;
    let n = values.len();

    // prefix sums keep this linear in n
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in values {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect()
}

/// Contact point by ratio of variances.
///
/// For each sample the variance of the following window is divided by the
/// variance of the preceding one; the contact is where the ratio peaks.
/// `win` is the window length in metres of piezo travel.
pub fn poc_rov(z: &[f64], d: &[f64], win: f64) -> Result<ContactPoint> {
    let n = z.len().min(d.len());
    if n < 5 {
        return Err(ContactError::NotEnoughPoints { needed: 5, got: n });
    }

    let step = z.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (n - 1) as f64;
    if step <= 0.0 || !step.is_finite() {
        return Err(ContactError::DegenerateWindow("height does not change".to_string()));
    }
    let win_pts = ((win / step).round() as usize).clamp(2, (n - 1) / 2);

    let mut best: Option<(usize, f64)> = None;
    for i in win_pts..n - win_pts {
        let prev = variance(&d[i - win_pts..i]);
        let next = variance(&d[i + 1..=i + win_pts]);
        if prev <= 0.0 {
            continue;
        }
        let rov = next / prev;
        if best.map_or(true, |(_, b)| rov > b) {
            best = Some((i, rov));
        }
    }

    let (idx, _) = best.ok_or(ContactError::NoContact)?;
    log::debug!("RoV contact at sample {} (window {} points)", idx, win_pts);
    Ok([z[idx], d[idx]])
}

/// Contact point at the last upward zero crossing of the deflection.
pub fn poc_regula_falsi(z: &[f64], d: &[f64]) -> Result<ContactPoint> {
    let n = z.len().min(d.len());
    if n < 2 {
        return Err(ContactError::NotEnoughPoints { needed: 2, got: n });
    }

    let crossing = (0..n - 1).rev().find(|&i| d[i] <= 0.0 && d[i + 1] > 0.0);
    let i = crossing.ok_or(ContactError::NoContact)?;

    let (z0, z1, d0, d1) = (z[i], z[i + 1], d[i], d[i + 1]);
    let zc = z0 - d0 * (z1 - z0) / (d1 - d0);
    Ok([zc, 0.0])
}

/// Compute force and indentation on every segment.
///
/// `force = (d - dc) * k`, `indentation = (z - zc) - (d - dc)`.
pub fn to_force_indentation(curve: &mut ForceCurve, poc: ContactPoint, k: f64) -> Result<()> {
    let [zc, dc] = poc;
    for segment in &mut curve.segments {
        if segment.deflection.len() != segment.len() {
            return Err(ContactError::NotPreprocessed);
        }
        segment.force = segment.deflection.iter().map(|d| (d - dc) * k).collect();
        segment.indentation = segment
            .zheight
            .iter()
            .zip(&segment.deflection)
            .map(|(z, d)| (z - zc) - (d - dc))
            .collect();
    }
    Ok(())
}

/// Find the contact point of a corrected curve with the configured method.
pub fn find_contact_point(curve: &ForceCurve, cfg: &FitConfig) -> Result<ContactPoint> {
    let ext = curve
        .segments
        .iter()
        .find(|s| s.kind == SegmentKind::Extend)
        .ok_or(ContactError::NoExtendSegment)?;
    if ext.deflection.len() != ext.len() {
        return Err(ContactError::NotPreprocessed);
    }
    let smoothed = smooth(&ext.deflection, cfg.smoothing_win);

    match cfg.poc_method {
        PocMethod::Rov => poc_rov(&ext.zheight, &smoothed, cfg.poc_win),
        PocMethod::RegulaFalsi => poc_regula_falsi(&ext.zheight, &smoothed),
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::curve::tests::synthetic_curve;

    fn prepared_curve() -> ForceCurve {
        let mut curve = synthetic_curve();
        curve.preprocess_force_curve(1.0);
        curve.shift_height();
        curve
    }

    #[test]
    fn test_smooth_identity_and_average() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(smooth(&values, 1), values.to_vec());

        let smoothed = smooth(&values, 3);
        assert_eq!(smoothed, vec![1.5, 2.0, 3.0, 4.0, 4.5]);
    }

    #[test]
    fn test_correct_offset_percentage() {
        let mut curve = prepared_curve();
        for segment in &mut curve.segments {
            for d in &mut segment.deflection {
                *d += 0.25;
            }
        }

        let offset = correct_offset(&mut curve, &FitConfig::default()).unwrap();
        assert!((offset - 0.25).abs() < 1e-12);
        assert!(curve.extend().unwrap().deflection[0].abs() < 1e-12);
    }

    #[test]
    fn test_correct_offset_empty_window() {
        let mut curve = prepared_curve();
        let cfg = FitConfig {
            offset_type: OffsetType::Value,
            min_offset: 1.0,
            max_offset: 2.0,
            ..FitConfig::default()
        };
        assert!(matches!(
            correct_offset(&mut curve, &cfg),
            Err(ContactError::DegenerateWindow(_))
        ));
    }

    #[test]
    fn test_correct_tilt_removes_linear_baseline() {
        let mut curve = prepared_curve();
        for segment in &mut curve.segments {
            for (d, z) in segment.deflection.iter_mut().zip(&segment.zheight) {
                *d += 0.5 * z + 0.1;
            }
        }

        let poc = [30.0 * 4e-8, 0.0];
        let cfg = FitConfig {
            tilt_min_offset: 0.0,
            tilt_max_offset: 1e-6,
            ..FitConfig::default()
        };
        let (slope, intercept) = correct_tilt(&mut curve, poc, &cfg).unwrap();
        assert!((slope - 0.5).abs() < 1e-9);
        assert!((intercept - 0.1).abs() < 1e-9);
        assert!(curve.extend().unwrap().deflection[10].abs() < 1e-9);
    }

    #[test]
    fn test_poc_regula_falsi_finds_last_crossing() {
        let z = [0.0, 1.0, 2.0, 3.0, 4.0];
        let d = [0.5, -1.0, -1.0, 1.0, 2.0];
        let poc = poc_regula_falsi(&z, &d).unwrap();
        assert!((poc[0] - 2.5).abs() < 1e-12);
        assert_eq!(poc[1], 0.0);

        assert!(matches!(poc_regula_falsi(&z, &[1.0; 5]), Err(ContactError::NoContact)));
    }

    #[test]
    fn test_poc_rov_on_noisy_ramp() {
        let n = 200;
        let z: Vec<f64> = (0..n).map(|i| i as f64 * 1e-8).collect();
        let d: Vec<f64> = (0..n)
            .map(|i| {
                let noise = if i % 2 == 0 { 1e-10 } else { -1e-10 };
                let signal = if i > 120 { (i - 120) as f64 * 1e-9 } else { 0.0 };
                signal + noise
            })
            .collect();

        let poc = poc_rov(&z, &d, 1e-7).unwrap();
        let idx = (poc[0] / 1e-8).round() as i64;
        assert!((idx - 120).abs() <= 2, "contact index {}", idx);
    }

    #[test]
    fn test_find_contact_point_regula_falsi() {
        let mut curve = prepared_curve();
        for segment in &mut curve.segments {
            for d in &mut segment.deflection {
                *d -= 0.005;
            }
        }
        let cfg = FitConfig {
            poc_method: PocMethod::RegulaFalsi,
            smoothing_win: 1,
            ..FitConfig::default()
        };
        let poc = find_contact_point(&curve, &cfg).unwrap();
        // deflection crosses 0.005 V between samples 30 and 31
        assert!(poc[0] > 30.0 * 4e-8 && poc[0] < 31.0 * 4e-8);
    }

    #[test]
    fn test_to_force_indentation() {
        let mut curve = prepared_curve();
        to_force_indentation(&mut curve, [1e-6, 0.0], 0.1).unwrap();

        assert!(curve.has_force_indentation());
        let ext = curve.extend().unwrap();
        let i = 40;
        assert!((ext.force[i] - ext.deflection[i] * 0.1).abs() < 1e-15);
        assert!((ext.indentation[i] - (ext.zheight[i] - 1e-6 - ext.deflection[i])).abs() < 1e-15);
    }
}
