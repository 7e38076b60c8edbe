//! Levenberg–Marquardt least squares.

use nalgebra::{DMatrix, DVector};

use super::{FitError, Result};

/// Outcome of a least squares fit.
#[derive(Debug, Clone)]
pub struct FitReport {
    pub params: Vec<f64>,
    /// Half the sum of squared residuals.
    pub cost: f64,
    /// Root mean square residual.
    pub rms: f64,
    pub r_squared: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Damped Gauss-Newton solver with a forward-difference Jacobian.
///
/// Parameters are projected onto `bounds` after every step. `scales` give
/// the typical magnitude of each parameter and set the finite-difference
/// step.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative cost decrease that counts as converged.
    pub ftol: f64,
    /// Relative step size that counts as converged.
    pub xtol: f64,
    pub initial_lambda: f64,
    pub bounds: Vec<(f64, f64)>,
    pub scales: Vec<f64>,
}

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
const DIFF_STEP: f64 = 1e-7;

impl LevenbergMarquardt {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ftol: 1e-10,
            xtol: 1e-10,
            initial_lambda: 1e-3,
            bounds: Vec::new(),
            scales: Vec::new(),
        }
    }

    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_scales(mut self, scales: Vec<f64>) -> Self {
        self.scales = scales;
        self
    }

    fn project(&self, params: &mut [f64]) {
        for (p, (lo, hi)) in params.iter_mut().zip(&self.bounds) {
            *p = p.clamp(*lo, *hi);
        }
    }

    fn step_size(&self, j: usize, value: f64) -> f64 {
        let scale = self.scales.get(j).copied().unwrap_or(1.0).abs();
        DIFF_STEP * value.abs().max(scale).max(f64::MIN_POSITIVE)
    }

    /// Minimise `sum((y - model(params))^2)`.
    ///
    /// `model` returns one prediction per observation in `y`.
    pub fn minimize<F>(&self, y: &[f64], initial: &[f64], model: F) -> Result<FitReport>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let n = y.len();
        let m = initial.len();
        if n < m {
            return Err(FitError::NotEnoughData { needed: m, got: n });
        }

        let observed = DVector::from_column_slice(y);
        let residuals = |params: &[f64]| -> Option<DVector<f64>> {
            let predicted = model(params);
            if predicted.len() != n {
                return None;
            }
            let r = &observed - DVector::from_vec(predicted);
            r.iter().all(|v| v.is_finite()).then_some(r)
        };

        let mut params = initial.to_vec();
        self.project(&mut params);
        let mut r = residuals(&params).ok_or(FitError::NonFiniteCost)?;
        let mut cost = 0.5 * r.norm_squared();

        let mut lambda = self.initial_lambda;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;

            let jac = self.jacobian(&params, &r, &residuals)?;
            let jt = jac.transpose();
            let jtj = &jt * &jac;
            let gradient = &jt * &r;

            let mut accepted = None;

            while lambda <= LAMBDA_MAX {
                let mut damped = jtj.clone();
                for k in 0..m {
                    damped[(k, k)] += lambda * jtj[(k, k)].max(f64::MIN_POSITIVE);
                }

                let Some(delta) = solve(damped, &gradient) else {
                    lambda *= 10.0;
                    continue;
                };

                let mut candidate: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
                self.project(&mut candidate);

                match residuals(&candidate) {
                    Some(r_new) if 0.5 * r_new.norm_squared() < cost => {
                        accepted = Some((candidate, r_new));
                        lambda = (lambda / 10.0).max(LAMBDA_MIN);
                        break;
                    }
                    _ => lambda *= 10.0,
                }
            }

            let Some((candidate, r_new)) = accepted else {
                // no descent direction left
                converged = true;
                break;
            };

            let new_cost = 0.5 * r_new.norm_squared();
            let cost_drop = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);
            let step = candidate
                .iter()
                .zip(&params)
                .enumerate()
                .map(|(j, (a, b))| (a - b).abs() / b.abs().max(self.scales.get(j).copied().unwrap_or(1.0).abs()))
                .fold(0.0, f64::max);

            params = candidate;
            r = r_new;
            cost = new_cost;

            if cost_drop < self.ftol || step < self.xtol || cost == 0.0 {
                converged = true;
                break;
            }
        }

        let ss_res = r.norm_squared();
        let y_mean = observed.mean();
        let ss_tot: f64 = observed.iter().map(|v| (v - y_mean).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Ok(FitReport {
            params,
            cost,
            rms: (ss_res / n as f64).sqrt(),
            r_squared,
            iterations,
            converged,
        })
    }

    /// Jacobian of the model (minus the residual derivative).
    fn jacobian<R>(&self, params: &[f64], r: &DVector<f64>, residuals: &R) -> Result<DMatrix<f64>>
    where
        R: Fn(&[f64]) -> Option<DVector<f64>>,
    {
        let n = r.len();
        let m = params.len();
        let mut jac = DMatrix::zeros(n, m);

        for j in 0..m {
            let mut h = self.step_size(j, params[j]);
            let mut shifted = params.to_vec();
            shifted[j] += h;
            self.project(&mut shifted);
            if shifted[j] == params[j] {
                // at the upper bound, differentiate backwards
                shifted[j] = params[j] - h;
                self.project(&mut shifted);
                h = shifted[j] - params[j];
            } else {
                h = shifted[j] - params[j];
            }
            if h == 0.0 {
                continue;
            }

            let r_shift = residuals(&shifted).ok_or(FitError::NonFiniteCost)?;
            for i in 0..n {
                // r = y - f, so df/dp = -(dr/dp)
                jac[(i, j)] = (r[i] - r_shift[i]) / h;
            }
        }
        Ok(jac)
    }
}

fn solve(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    a.lu().solve(b).filter(|x| x.iter().all(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_exponential_decay() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|t| 3.0 * (-1.5 * t).exp() + 0.5).collect();

        let model = |p: &[f64]| -> Vec<f64> { x.iter().map(|t| p[0] * (-p[1] * t).exp() + p[2]).collect() };
        let report = LevenbergMarquardt::new(200).minimize(&y, &[1.0, 1.0, 0.0], model).unwrap();

        assert!((report.params[0] - 3.0).abs() < 1e-5);
        assert!((report.params[1] - 1.5).abs() < 1e-5);
        assert!((report.params[2] - 0.5).abs() < 1e-5);
        assert!(report.r_squared > 0.999_999);
        assert!(report.converged);
    }

    #[test]
    fn test_bounds_are_respected() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|t| 2.0 * t).collect();

        let model = |p: &[f64]| -> Vec<f64> { x.iter().map(|t| p[0] * t).collect() };
        let report = LevenbergMarquardt::new(100)
            .with_bounds(vec![(0.0, 1.0)])
            .minimize(&y, &[0.5], model)
            .unwrap();

        assert!((report.params[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_badly_scaled_parameters() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 1e-8).collect();
        let y: Vec<f64> = x.iter().map(|d| 2e3 * d * d + 1e-10).collect();

        let model = |p: &[f64]| -> Vec<f64> { x.iter().map(|d| p[0] * d * d + p[1]).collect() };
        let report = LevenbergMarquardt::new(200)
            .with_scales(vec![1e3, 1e-10])
            .minimize(&y, &[5e2, 0.0], model)
            .unwrap();

        assert!((report.params[0] - 2e3).abs() / 2e3 < 1e-6);
        assert!((report.params[1] - 1e-10).abs() < 1e-14);
    }

    #[test]
    fn test_not_enough_data() {
        let model = |p: &[f64]| -> Vec<f64> { vec![p[0]] };
        assert!(matches!(
            LevenbergMarquardt::new(10).minimize(&[1.0], &[0.0, 0.0], model),
            Err(FitError::NotEnoughData { needed: 2, got: 1 })
        ));
    }
}
