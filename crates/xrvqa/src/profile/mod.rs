//! Beam width (sigma) from a Gaussian fit to a line profile.
//!
//! A chord is drawn through the image center at a given angle, sampled once
//! per pixel, normalized by its maximum and fitted with
//! `a * exp(-(x - x0)² / 2σ²)` where `x = i * pitch`. Fits whose `|σ|` falls
//! outside the plausible range are refitted once from perturbed seeds and the
//! second result is kept as is.

mod gaussian;
mod nelder_mead;
mod sampling;

pub use gaussian::{fit_gaussian, sum_squared_residuals, GaussianFit, GaussianParams};
pub use nelder_mead::{minimize, Minimum, NelderMeadConfig};
pub use sampling::{bilinear_sample, chord_through_center, sample_chord, Chord};

use crate::error::AnalysisError;
use crate::spot_file::SpotImage;

/// Profile fit configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProfileFitConfig {
    /// Pixels kept clear between the chord ends and the nearest image edge.
    pub margin_px: usize,
    /// Amplitude seed of the first attempt.
    pub seed_amplitude: f64,
    /// Accepted `|σ|` range (mm), inclusive.
    pub plausible_sigma_mm: [f64; 2],
    /// Retry seed: `center * retry_center_factor`.
    pub retry_center_factor: f64,
    /// Retry seed: `sigma * retry_sigma_factor`.
    pub retry_sigma_factor: f64,
    /// Retry seed amplitude.
    pub retry_amplitude: f64,
    pub optimizer: NelderMeadConfig,
}

impl Default for ProfileFitConfig {
    fn default() -> Self {
        Self {
            margin_px: 20,
            seed_amplitude: 0.972,
            plausible_sigma_mm: [2.5, 8.0],
            retry_center_factor: 1.5,
            retry_sigma_factor: 5.1,
            retry_amplitude: 0.981,
            optimizer: NelderMeadConfig::default(),
        }
    }
}

impl ProfileFitConfig {
    pub fn is_plausible(&self, sigma_mm: f64) -> bool {
        let [lo, hi] = self.plausible_sigma_mm;
        (lo..=hi).contains(&sigma_mm.abs())
    }
}

/// Normalized intensity profile with its physical sample positions.
#[derive(Debug, Clone)]
pub struct Profile {
    /// `i * pitch` (mm).
    pub xs: Vec<f64>,
    /// Samples divided by their maximum.
    pub ys: Vec<f64>,
    pub pitch_mm: f64,
}

/// Outcome of a profile fit.
#[derive(Debug, Clone, Copy)]
pub struct ProfileFit {
    /// `|σ|` of the accepted fit (mm).
    pub sigma_mm: f64,
    /// Parameters of the accepted fit.
    pub params: GaussianParams,
    /// Seed of the accepted fit.
    pub seed: GaussianParams,
    /// `|σ|` of the first attempt, before any retry.
    pub first_sigma_mm: f64,
    /// 1, or 2 when the first result was out of range.
    pub attempts: usize,
    pub residual: f64,
    pub n_samples: usize,
}

impl ProfileFit {
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Sample and normalize the chord profile at `angle_deg`.
pub fn extract_profile(
    image: &SpotImage,
    angle_deg: f64,
    pitch_mm: f64,
    margin_px: usize,
) -> Result<Profile, AnalysisError> {
    let chord = chord_through_center(image.ncols(), image.nrows(), angle_deg, margin_px)?;
    let raw = sample_chord(image.pixels(), &chord);
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if raw.is_empty() || max <= 0.0 || raw.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::DegenerateProfile);
    }
    Ok(Profile {
        xs: (0..raw.len()).map(|i| i as f64 * pitch_mm).collect(),
        ys: raw.iter().map(|v| v / max).collect(),
        pitch_mm,
    })
}

/// First-attempt seed: `center = mean(y)`, `sigma = pitch * Σ y (x - center)² / n`.
///
/// The center seed is the mean intensity, not a centroid; the optimizer only
/// needs a starting point.
pub fn initial_seed(profile: &Profile, amplitude: f64) -> GaussianParams {
    let n = profile.ys.len() as f64;
    let center = profile.ys.iter().sum::<f64>() / n;
    let spread: f64 = profile
        .xs
        .iter()
        .zip(&profile.ys)
        .map(|(&x, &y)| y * (x - center) * (x - center))
        .sum();
    GaussianParams {
        amplitude,
        center,
        sigma: profile.pitch_mm * spread / n,
    }
}

/// Fit `xs`/`ys` from `seed`, retrying once when `|σ|` is implausible.
pub fn fit_normalized_profile(
    xs: &[f64],
    ys: &[f64],
    seed: GaussianParams,
    cfg: &ProfileFitConfig,
) -> ProfileFit {
    let first = fit_gaussian(xs, ys, seed, &cfg.optimizer);
    let first_sigma_mm = first.params.sigma.abs();

    let (fit, used_seed, attempts) = if cfg.is_plausible(first_sigma_mm) {
        (first, seed, 1)
    } else {
        tracing::warn!(
            "implausible sigma {:.3} mm (range {:?}); refitting from perturbed seed",
            first_sigma_mm,
            cfg.plausible_sigma_mm
        );
        let retry_seed = GaussianParams {
            amplitude: cfg.retry_amplitude,
            center: seed.center * cfg.retry_center_factor,
            sigma: seed.sigma * cfg.retry_sigma_factor,
        };
        let retry = fit_gaussian(xs, ys, retry_seed, &cfg.optimizer);
        if !cfg.is_plausible(retry.params.sigma) {
            tracing::warn!(
                "sigma {:.3} mm still outside {:?} after refit; keeping it",
                retry.params.sigma.abs(),
                cfg.plausible_sigma_mm
            );
        }
        (retry, retry_seed, 2)
    };

    ProfileFit {
        sigma_mm: fit.params.sigma.abs(),
        params: fit.params,
        seed: used_seed,
        first_sigma_mm,
        attempts,
        residual: fit.residual,
        n_samples: xs.len(),
    }
}

/// Fit the profile of `image` along `angle_deg` and return the full fit record.
pub fn fit_profile(
    image: &SpotImage,
    angle_deg: f64,
    pitch_mm: f64,
    cfg: &ProfileFitConfig,
) -> Result<ProfileFit, AnalysisError> {
    let profile = extract_profile(image, angle_deg, pitch_mm, cfg.margin_px)?;
    let seed = initial_seed(&profile, cfg.seed_amplitude);
    let fit = fit_normalized_profile(&profile.xs, &profile.ys, seed, cfg);
    if !fit.sigma_mm.is_finite() {
        return Err(AnalysisError::NonFiniteFit);
    }
    tracing::debug!(
        "angle {} deg: sigma {:.4} mm ({} samples, {} attempt(s))",
        angle_deg,
        fit.sigma_mm,
        fit.n_samples,
        fit.attempts
    );
    Ok(fit)
}

/// Beam sigma (mm) along `angle_deg`.
pub fn sigma_along_angle(
    image: &SpotImage,
    angle_deg: f64,
    pitch_mm: f64,
    cfg: &ProfileFitConfig,
) -> Result<f64, AnalysisError> {
    fit_profile(image, angle_deg, pitch_mm, cfg).map(|f| f.sigma_mm)
}
