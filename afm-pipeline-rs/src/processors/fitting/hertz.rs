//! Hertz elastic contact fit.

use crate::config::{FitConfig, FitRangeType};
use crate::processors::hysteresis::{argmax, downsample_indices};

use super::lm::{FitReport, LevenbergMarquardt};
use super::{ContactGeometry, FitError, Result};

/// Fitted Hertz parameters.
#[derive(Debug, Clone)]
pub struct HertzResult {
    /// Young's modulus (Pa).
    pub e0: f64,
    /// Contact point on the indentation axis (m).
    pub delta0: f64,
    /// Force offset (N).
    pub f0: f64,
    /// Baseline slope before contact (N/m), zero unless fitted.
    pub slope: f64,
    pub geometry: ContactGeometry,
    pub fit_line: bool,
    pub report: FitReport,
}

impl HertzResult {
    pub fn eval(&self, indentation: &[f64]) -> Vec<f64> {
        let params = [self.e0, self.delta0, self.f0, self.slope];
        let params = if self.fit_line { &params[..] } else { &params[..3] };
        hertz_model(&self.geometry, params, indentation)
    }
}

/// `F = f0 + g*E*max(d - d0, 0)^n`, plus `slope*min(d - d0, 0)` when a
/// fourth parameter is given.
pub fn hertz_model(geometry: &ContactGeometry, params: &[f64], indentation: &[f64]) -> Vec<f64> {
    let g = geometry.hertz_factor();
    let n = geometry.exponent();
    let (e0, delta0, f0) = (params[0], params[1], params[2]);
    let slope = params.get(3).copied();

    indentation
        .iter()
        .map(|d| {
            let rel = d - delta0;
            let contact = f0 + g * e0 * rel.max(0.0).powf(n);
            match slope {
                Some(s) => contact + s * rel.min(0.0),
                None => contact,
            }
        })
        .collect()
}

/// Hertz fit over one segment of a force-indentation curve.
pub struct HertzFit<'a> {
    cfg: &'a FitConfig,
    geometry: ContactGeometry,
}

impl<'a> HertzFit<'a> {
    pub fn new(cfg: &'a FitConfig) -> Self {
        Self {
            cfg,
            geometry: ContactGeometry::from_config(cfg),
        }
    }

    /// Samples used by the fit: near or past contact, inside the fit range,
    /// then downsampled.
    fn select(&self, indentation: &[f64], force: &[f64]) -> Vec<usize> {
        let cfg = self.cfg;
        let mut idx: Vec<usize> = (0..indentation.len().min(force.len()))
            .filter(|&i| indentation[i] > -cfg.contact_offset)
            .filter(|&i| match cfg.fit_range_type {
                FitRangeType::Indentation if cfg.max_ind > cfg.min_ind => {
                    indentation[i] >= cfg.min_ind && indentation[i] <= cfg.max_ind
                }
                FitRangeType::Force if cfg.max_force > cfg.min_force => {
                    force[i] >= cfg.min_force && force[i] <= cfg.max_force
                }
                _ => true,
            })
            .collect();

        if cfg.downsample_flag && idx.len() > cfg.pts_downsample {
            idx = downsample_indices(idx.len(), cfg.pts_downsample)
                .into_iter()
                .map(|i| idx[i])
                .collect();
        }
        idx
    }

    pub fn fit(&self, indentation: &[f64], force: &[f64]) -> Result<HertzResult> {
        if indentation.len() != force.len() || indentation.is_empty() {
            return Err(FitError::NotConverted);
        }
        let cfg = self.cfg;
        let idx = self.select(indentation, force);
        let n_params = if cfg.fit_line { 4 } else { 3 };
        if idx.len() <= n_params {
            return Err(FitError::NotEnoughData {
                needed: n_params + 1,
                got: idx.len(),
            });
        }

        let x: Vec<f64> = idx.iter().map(|&i| indentation[i]).collect();
        let y: Vec<f64> = idx.iter().map(|&i| force[i]).collect();

        let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let y_min = y.iter().copied().fold(f64::INFINITY, f64::min);
        let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let x_span = (x_max - x_min).max(f64::MIN_POSITIVE);
        let y_span = (y_max - y_min).max(f64::MIN_POSITIVE);

        let delta0 = cfg.d0.clamp(x_min, x_max);
        let e0 = if cfg.auto_init_e0 {
            self.initial_modulus(&x, &y, delta0).unwrap_or(cfg.e0)
        } else {
            cfg.e0
        };

        let mut initial = vec![e0, delta0, cfg.f0];
        let mut bounds = vec![(0.0, f64::INFINITY), (x_min, x_max), (f64::NEG_INFINITY, f64::INFINITY)];
        let mut scales = vec![e0.abs().max(1.0), x_span * 1e-2, y_span * 1e-2];
        if cfg.fit_line {
            initial.push(cfg.slope);
            bounds.push((f64::NEG_INFINITY, f64::INFINITY));
            scales.push(y_span / x_span * 1e-2);
        }

        let geometry = self.geometry;
        let report = LevenbergMarquardt::new(cfg.max_iterations)
            .with_bounds(bounds)
            .with_scales(scales)
            .minimize(&y, &initial, |p| hertz_model(&geometry, p, &x))?;

        if !report.converged {
            log::warn!("Hertz fit stopped after {} iterations without converging", report.iterations);
        }

        let p = &report.params;
        let (e0, delta0, f0) = (p[0], p[1], p[2]);
        let slope = p.get(3).copied().unwrap_or(0.0);
        Ok(HertzResult {
            e0,
            delta0,
            f0,
            slope,
            geometry,
            fit_line: cfg.fit_line,
            report,
        })
    }

    /// Modulus passing through the largest force sample.
    fn initial_modulus(&self, x: &[f64], y: &[f64], delta0: f64) -> Option<f64> {
        let i = argmax(y)?;
        let depth = x[i] - delta0;
        if depth <= 0.0 {
            return None;
        }
        let e0 = (y[i] - self.cfg.f0) / (self.geometry.hertz_factor() * depth.powf(self.geometry.exponent()));
        (e0.is_finite() && e0 > 0.0).then_some(e0)
    }
}
