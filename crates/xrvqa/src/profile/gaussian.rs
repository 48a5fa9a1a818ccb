//! 1-D Gaussian model and least-squares fit.

use nalgebra::Vector3;

use super::nelder_mead::{minimize, NelderMeadConfig};

/// `amplitude * exp(-(x - center)² / (2 sigma²))`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GaussianParams {
    pub amplitude: f64,
    pub center: f64,
    pub sigma: f64,
}

impl GaussianParams {
    pub fn eval(&self, x: f64) -> f64 {
        let d = x - self.center;
        self.amplitude * (-(d * d) / (2.0 * self.sigma * self.sigma)).exp()
    }

    fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.amplitude, self.center, self.sigma)
    }

    fn from_vector(v: &Vector3<f64>) -> Self {
        Self {
            amplitude: v[0],
            center: v[1],
            sigma: v[2],
        }
    }
}

/// Result of [`fit_gaussian`].
#[derive(Debug, Clone, Copy)]
pub struct GaussianFit {
    pub params: GaussianParams,
    /// Sum of squared residuals at `params`.
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Sum of squared residuals of `params` against the samples.
pub fn sum_squared_residuals(xs: &[f64], ys: &[f64], params: &GaussianParams) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - params.eval(x);
            r * r
        })
        .sum()
}

/// Least-squares Gaussian fit from `seed`.
pub fn fit_gaussian(
    xs: &[f64],
    ys: &[f64],
    seed: GaussianParams,
    cfg: &NelderMeadConfig,
) -> GaussianFit {
    let cost = |v: &Vector3<f64>| sum_squared_residuals(xs, ys, &GaussianParams::from_vector(v));
    let m = minimize(cost, seed.to_vector(), cfg);
    GaussianFit {
        params: GaussianParams::from_vector(&m.x),
        residual: m.value,
        iterations: m.iterations,
        converged: m.converged,
    }
}
