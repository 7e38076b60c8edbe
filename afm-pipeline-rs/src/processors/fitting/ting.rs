//! Ting viscoelastic fit with power-law relaxation.
//!
//! The relaxation modulus is `E(t) = E0 * (t / t0)^-beta`. Forces follow
//! Ting's solution for a Hertzian indenter: during approach
//!
//! ```text
//! F(t) = f0 + g * integral_0^t E(t - s) d[delta(s)^n]/ds ds
//! ```
//!
//! and during retraction the upper limit becomes `t1(t)`, the time where
//! `integral_t1^t E(t - s) ddelta/ds ds = 0`. Both integrals are evaluated
//! by product integration on the sample grid: the derivative is constant on
//! each interval and the kernel is integrated exactly.

use crate::config::FitConfig;
use crate::core::curve::ForceCurve;
use crate::processors::hysteresis::{argmax, downsample_indices, nearest_index};

use super::hertz::HertzResult;
use super::lm::{FitReport, LevenbergMarquardt};
use super::{ContactGeometry, FitError, Result};

const BETA_MIN: f64 = 1e-4;
const BETA_MAX: f64 = 0.99;
const BETA_GRID: [f64; 10] = [0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5];

/// Approach and retract joined on one time axis, in contact coordinates.
///
/// Time is zero where the extend indentation is closest to zero, samples
/// further than `contact_offset` from contact are dropped and the force is
/// zeroed on the first kept sample.
#[derive(Debug, Clone, Default)]
pub struct ContactFrame {
    pub time: Vec<f64>,
    pub indentation: Vec<f64>,
    pub force: Vec<f64>,
}

impl ContactFrame {
    pub fn from_curve(curve: &ForceCurve, contact_offset: f64) -> Result<Self> {
        let ext = curve.extend().ok_or(FitError::MissingSegment("extend"))?;
        let ret = curve.retract().ok_or(FitError::MissingSegment("retract"))?;
        for segment in [ext, ret] {
            if segment.indentation.len() != segment.len() || segment.force.len() != segment.len() {
                return Err(FitError::NotConverted);
            }
        }

        let t_offset = ext.time.last().copied().unwrap_or(0.0);
        let time: Vec<f64> = ext
            .time
            .iter()
            .copied()
            .chain(ret.time.iter().map(|t| t + t_offset))
            .collect();
        let indentation: Vec<f64> = ext.indentation.iter().chain(&ret.indentation).copied().collect();
        let force: Vec<f64> = ext.force.iter().chain(&ret.force).copied().collect();

        let abs_ind: Vec<f64> = ext.indentation.iter().map(|d| -d.abs()).collect();
        let idx_tc = argmax(&abs_ind).ok_or(FitError::NotEnoughData { needed: 1, got: 0 })?;
        let tc = time[idx_tc];

        let keep: Vec<usize> = (0..indentation.len())
            .filter(|&i| indentation[i] > -contact_offset)
            .collect();
        let Some(&first) = keep.first() else {
            return Err(FitError::NotEnoughData { needed: 1, got: 0 });
        };
        let f_first = force[first];

        Ok(Self {
            time: keep.iter().map(|&i| time[i] - tc).collect(),
            indentation: keep.iter().map(|&i| indentation[i]).collect(),
            force: keep.iter().map(|&i| force[i] - f_first).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Keep every `len / pts`-th sample.
    pub fn downsample(&self, pts: usize) -> Self {
        let idx = downsample_indices(self.len(), pts);
        let pick = |v: &[f64]| -> Vec<f64> { idx.iter().map(|&i| v[i]).collect() };
        Self {
            time: pick(&self.time[..]),
            indentation: pick(&self.indentation[..]),
            force: pick(&self.force[..]),
        }
    }
}

/// Fitted Ting parameters.
#[derive(Debug, Clone)]
pub struct TingResult {
    /// Modulus at `t0` (Pa).
    pub e0: f64,
    /// Contact time in the frame's time axis (s).
    pub tc: f64,
    /// Fluidity exponent.
    pub beta: f64,
    /// Force offset (N).
    pub f0: f64,
    pub t0: f64,
    pub vdrag: f64,
    pub geometry: ContactGeometry,
    pub report: FitReport,
}

impl TingResult {
    /// Model force on a frame's time and indentation.
    pub fn eval(&self, frame: &TingInput) -> Vec<f64> {
        ting_model(frame, &self.geometry, self.t0, self.vdrag, &[self.e0, self.tc, self.beta, self.f0])
    }
}

/// Samples the Ting model is evaluated on.
#[derive(Debug, Clone)]
pub struct TingInput<'a> {
    pub time: &'a [f64],
    pub indentation: &'a [f64],
    /// Index of the turnaround (maximum indentation).
    pub idx_tm: usize,
}

impl<'a> TingInput<'a> {
    pub fn new(frame: &'a ContactFrame) -> Option<Self> {
        let idx_tm = argmax(&frame.indentation)?;
        Some(Self {
            time: &frame.time,
            indentation: &frame.indentation,
            idx_tm,
        })
    }
}

fn interpolate(x: &[f64], y: &[f64], at: f64) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    if at <= x[0] {
        return y[0];
    }
    for i in 1..n {
        if at <= x[i] {
            let span = x[i] - x[i - 1];
            if span <= 0.0 {
                return y[i];
            }
            let w = (at - x[i - 1]) / span;
            return y[i - 1] + w * (y[i] - y[i - 1]);
        }
    }
    y[n - 1]
}

/// Evaluate the Ting force for `params = [E0, tc, beta, f0]`.
pub fn ting_model(
    input: &TingInput,
    geometry: &ContactGeometry,
    t0: f64,
    vdrag: f64,
    params: &[f64],
) -> Vec<f64> {
    let (e0, tc, f0) = (params[0], params[1], params[3]);
    let beta = params[2].clamp(BETA_MIN, BETA_MAX);
    let time = input.time;
    let n = time.len().min(input.indentation.len());
    let exponent = geometry.exponent();

    let ind_tc = interpolate(time, input.indentation, tc);
    let delta: Vec<f64> = (0..n)
        .map(|i| {
            if time[i] < tc {
                0.0
            } else {
                (input.indentation[i] - ind_tc).max(0.0)
            }
        })
        .collect();
    let loading: Vec<f64> = delta.iter().map(|d| d.powf(exponent)).collect();

    let coef = geometry.hertz_factor() * e0 * t0.powf(beta) / (1.0 - beta);
    let power = 1.0 - beta;

    // integral of (t - s)^-beta over [a, b], times (1 - beta)
    let kernel = |t: f64, a: f64, b: f64| (t - a).max(0.0).powf(power) - (t - b).max(0.0).powf(power);
    let rate = |v: &[f64], j: usize| {
        let dt = time[j + 1] - time[j];
        if dt > 0.0 {
            (v[j + 1] - v[j]) / dt
        } else {
            0.0
        }
    };

    let mut force = Vec::with_capacity(n);
    for i in 0..n {
        let t = time[i];

        let upper = if i <= input.idx_tm {
            Some(i)
        } else {
            // scan back from t for the time where the indentation history
            // integral returns to zero
            let mut acc = 0.0;
            let mut unloading = false;
            let mut found = None;
            for j in (0..i).rev() {
                let r = rate(&delta[..], j);
                if r == 0.0 {
                    continue;
                }
                acc += r * kernel(t, time[j], time[j + 1]);
                if acc < 0.0 {
                    unloading = true;
                } else if unloading {
                    found = Some(j);
                    break;
                }
            }
            if unloading {
                found
            } else {
                Some(i)
            }
        };

        let value = match upper {
            Some(k) => (0..k).map(|j| rate(&loading[..], j) * kernel(t, time[j], time[j + 1])).sum::<f64>(),
            // contact lost
            None => 0.0,
        };
        force.push(f0 + coef * value);
    }

    if vdrag != 0.0 {
        for i in 0..n {
            let (a, b) = (i.saturating_sub(1), (i + 1).min(n - 1));
            let dt = time[b] - time[a];
            if dt > 0.0 {
                force[i] += vdrag * (delta[b] - delta[a]) / dt;
            }
        }
    }
    force
}

/// Ting fit over a whole approach/retract cycle.
pub struct TingFit<'a> {
    cfg: &'a FitConfig,
    geometry: ContactGeometry,
}

impl<'a> TingFit<'a> {
    pub fn new(cfg: &'a FitConfig) -> Self {
        Self {
            cfg,
            geometry: ContactGeometry::from_config(cfg),
        }
    }

    /// Fit `frame`, starting the contact time where the indentation reaches
    /// the Hertz contact point.
    pub fn fit(&self, frame: &ContactFrame, hertz: &HertzResult) -> Result<TingResult> {
        let cfg = self.cfg;
        let input = TingInput::new(frame).ok_or(FitError::NotEnoughData { needed: 5, got: 0 })?;
        if frame.len() < 5 {
            return Err(FitError::NotEnoughData {
                needed: 5,
                got: frame.len(),
            });
        }

        let approach = &frame.indentation[..=input.idx_tm];
        let idx_c = nearest_index(approach, hertz.delta0).unwrap_or(0);
        let t_lo = frame.time[0];
        let t_hi = frame.time[input.idx_tm];
        let tc = if cfg.tc != 0.0 {
            cfg.tc.clamp(t_lo, t_hi)
        } else {
            frame.time[idx_c]
        };

        let (e0, beta) = self.initial_guess(&input, &frame.force, tc);

        let f_span = frame.force.iter().copied().fold(0.0_f64, |m, f| m.max(f.abs()));
        let scales = vec![
            e0.abs().max(1.0),
            ((t_hi - t_lo) * 1e-2).max(1e-6),
            0.1,
            (f_span * 1e-2).max(1e-15),
        ];
        let bounds = vec![
            (0.0, f64::INFINITY),
            (t_lo, t_hi),
            (BETA_MIN, BETA_MAX),
            (f64::NEG_INFINITY, f64::INFINITY),
        ];

        let geometry = self.geometry;
        let (t0, vdrag) = (cfg.t0, cfg.vdrag);
        let report = LevenbergMarquardt::new(cfg.max_iterations)
            .with_bounds(bounds)
            .with_scales(scales)
            .minimize(&frame.force, &[e0, tc, beta, cfg.f0], |p| {
                ting_model(&input, &geometry, t0, vdrag, p)
            })?;

        if !report.converged {
            log::warn!("Ting fit stopped after {} iterations without converging", report.iterations);
        }

        let p = &report.params;
        let (e0, tc, beta, f0) = (p[0], p[1], p[2], p[3]);
        Ok(TingResult {
            e0,
            tc,
            beta,
            f0,
            t0,
            vdrag,
            geometry,
            report,
        })
    }

    /// Starting modulus and exponent.
    ///
    /// The model is linear in `E0`, so for each candidate exponent the best
    /// modulus has a closed form; the pair with the lowest cost wins.
    fn initial_guess(&self, input: &TingInput, force: &[f64], tc: f64) -> (f64, f64) {
        let cfg = self.cfg;
        let betas: Vec<f64> = if cfg.auto_init_beta {
            BETA_GRID.to_vec()
        } else {
            vec![cfg.fluid_exp.clamp(BETA_MIN, BETA_MAX)]
        };

        let mut best = (cfg.e0, betas[0], f64::INFINITY);
        for beta in betas {
            let basis = ting_model(input, &self.geometry, cfg.t0, 0.0, &[1.0, tc, beta, 0.0]);
            let drag = ting_model(input, &self.geometry, cfg.t0, cfg.vdrag, &[0.0, tc, beta, cfg.f0]);
            let target: Vec<f64> = force.iter().zip(&drag).map(|(f, d)| f - d).collect();

            let bb: f64 = basis.iter().map(|b| b * b).sum();
            let e0 = if cfg.auto_init_e0 && bb > 0.0 {
                let by: f64 = basis.iter().zip(&target).map(|(b, y)| b * y).sum();
                by / bb
            } else {
                cfg.e0
            };
            if !(e0.is_finite() && e0 > 0.0) {
                continue;
            }

            let cost: f64 = basis
                .iter()
                .zip(&target)
                .map(|(b, y)| (y - e0 * b).powi(2))
                .sum();
            if cost < best.2 {
                best = (e0, beta, cost);
            }
        }
        (best.0, best.1)
    }
}
