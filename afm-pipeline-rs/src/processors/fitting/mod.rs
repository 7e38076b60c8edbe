//! Elastic (Hertz) and viscoelastic (Ting) contact model fits.

pub mod hertz;
pub mod lm;
pub mod ting;

use thiserror::Error;

use crate::config::{ContactModel, CurveSegment, FitConfig};
use crate::core::curve::ForceCurve;
use crate::processors::contact::{self, ContactError};

pub use hertz::{HertzFit, HertzResult};
pub use lm::{FitReport, LevenbergMarquardt};
pub use ting::{ContactFrame, TingFit, TingResult};

/// Errors raised by the fitting layer.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("Not enough data to fit: need {needed} points, got {got}")]
    NotEnoughData { needed: usize, got: usize },

    #[error("Model produced a non-finite cost")]
    NonFiniteCost,

    #[error("Curve has no {0} segment")]
    MissingSegment(&'static str),

    #[error("Force and indentation have not been computed")]
    NotConverted,

    #[error(transparent)]
    Contact(#[from] ContactError),
}

/// Result type for fitting operations.
pub type Result<T> = std::result::Result<T, FitError>;

/// Indenter geometry with its Hertz prefactor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactGeometry {
    pub model: ContactModel,
    /// Tip radius (m) or half-angle (degrees).
    pub tip_param: f64,
    pub poisson: f64,
}

impl ContactGeometry {
    pub fn new(model: ContactModel, tip_param: f64, poisson: f64) -> Self {
        Self { model, tip_param, poisson }
    }

    pub fn from_config(cfg: &FitConfig) -> Self {
        Self::new(cfg.contact_model, cfg.tip_param, cfg.poisson)
    }

    /// Prefactor `g` in `F = g * E * delta^n`.
    pub fn hertz_factor(&self) -> f64 {
        let nu = 1.0 - self.poisson * self.poisson;
        match self.model {
            ContactModel::Paraboloid => 4.0 / 3.0 * self.tip_param.sqrt() / nu,
            ContactModel::Cone => 2.0 / std::f64::consts::PI * self.tip_param.to_radians().tan() / nu,
            ContactModel::Pyramid => 0.7453 * self.tip_param.to_radians().tan() / nu,
        }
    }

    /// Indentation exponent `n`.
    pub fn exponent(&self) -> f64 {
        match self.model {
            ContactModel::Paraboloid => 1.5,
            ContactModel::Cone | ContactModel::Pyramid => 2.0,
        }
    }
}

/// Run the full fitting chain on a preprocessed curve.
///
/// Applies the baseline offset, finds the contact point (optionally after
/// tilt correction), converts to force vs indentation with spring constant
/// `k`, then fits Hertz on the configured segment and Ting on the whole
/// approach/retract cycle.
pub fn do_ting_fit(curve: &mut ForceCurve, cfg: &FitConfig, k: f64) -> Result<(TingResult, HertzResult)> {
    let offset = contact::correct_offset(curve, cfg)?;
    let mut poc = contact::find_contact_point(curve, cfg)?;

    if cfg.correct_tilt {
        contact::correct_tilt(curve, poc, cfg)?;
        poc = contact::find_contact_point(curve, cfg)?;
    }
    log::debug!(
        "curve {}: offset {:.3e} m, contact at z = {:.3e} m",
        curve.index,
        offset,
        poc[0]
    );

    contact::to_force_indentation(curve, poc, k)?;

    let segment = match cfg.curve_seg {
        CurveSegment::Extend => curve.extend().ok_or(FitError::MissingSegment("extend"))?,
        CurveSegment::Retract => curve.retract().ok_or(FitError::MissingSegment("retract"))?,
    };
    let hertz = HertzFit::new(cfg).fit(&segment.indentation, &segment.force)?;

    let mut frame = ContactFrame::from_curve(curve, cfg.contact_offset)?;
    if cfg.downsample_flag {
        frame = frame.downsample(cfg.pts_downsample);
    }
    let ting = TingFit::new(cfg).fit(&frame, &hertz)?;

    log::debug!(
        "curve {}: Hertz E = {:.1} Pa, Ting E0 = {:.1} Pa, beta = {:.3}",
        curve.index,
        hertz.e0,
        ting.e0,
        ting.beta
    );
    Ok((ting, hertz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{FileType, JpkArchive};
    use crate::fixtures;
    use std::io::Cursor;

    #[test]
    fn test_hertz_factor_paraboloid() {
        let geometry = ContactGeometry::new(ContactModel::Paraboloid, 4e-6, 0.5);
        let expected = 4.0 / 3.0 * 2e-3 / 0.75;
        assert!((geometry.hertz_factor() - expected).abs() < 1e-15);
        assert_eq!(geometry.exponent(), 1.5);
    }

    #[test]
    fn test_hertz_factor_cone_and_pyramid() {
        let cone = ContactGeometry::new(ContactModel::Cone, 45.0, 0.0);
        assert!((cone.hertz_factor() - 2.0 / std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(cone.exponent(), 2.0);

        let pyramid = ContactGeometry::new(ContactModel::Pyramid, 45.0, 0.0);
        assert!((pyramid.hertz_factor() - 0.7453).abs() < 1e-12);
    }

    #[test]
    fn test_do_ting_fit_on_synthetic_map() {
        let bytes = fixtures::force_map_bytes(1, false);
        let mut archive =
            JpkArchive::from_reader(Cursor::new(bytes), FileType::JpkForceMap, "fit.jpk-force-map").unwrap();
        let meta = archive.metadata().clone();
        let mut curve = archive.curve(0).unwrap();
        curve.preprocess_force_curve(meta.defl_sens_m_by_v());
        curve.shift_height();

        let cfg = FitConfig::default();
        let (ting, hertz) = do_ting_fit(&mut curve, &cfg, meta.spring_const_n_by_m).unwrap();

        assert!(curve.has_force_indentation());
        let relative = (hertz.e0 - fixtures::YOUNG_MODULUS).abs() / fixtures::YOUNG_MODULUS;
        assert!(relative < 0.2, "Hertz modulus {}", hertz.e0);
        assert!(hertz.report.r_squared > 0.95);

        assert!(ting.e0.is_finite() && ting.e0 > 0.0);
        assert!(ting.beta > 0.0 && ting.beta < 1.0);
    }
}
