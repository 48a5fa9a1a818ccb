//! Nelder–Mead downhill simplex minimizer.
//!
//! Gradient-free, so it tolerates objectives that are non-smooth or return
//! non-finite values (treated as `+inf`). The initial simplex perturbs each
//! coordinate by 5 % (or a small absolute step for zero coordinates).

use nalgebra::SVector;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;
const NONZERO_STEP: f64 = 0.05;
const ZERO_STEP: f64 = 0.00025;

/// Stopping controls for [`minimize`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Iteration cap per simplex run.
    pub max_iters: usize,
    /// Converged when every vertex is within this distance (max-norm) of the best.
    pub xatol: f64,
    /// ...and every vertex value is within this of the best value.
    pub fatol: f64,
    /// Extra runs restarted from the best point with a fresh simplex.
    pub restarts: usize,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            xatol: 1e-8,
            fatol: 1e-12,
            restarts: 2,
        }
    }
}

/// Best point found.
#[derive(Debug, Clone, Copy)]
pub struct Minimum<const N: usize> {
    pub x: SVector<f64, N>,
    pub value: f64,
    /// Iterations summed over all runs.
    pub iterations: usize,
    /// The final run met the tolerance before the iteration cap.
    pub converged: bool,
}

/// Minimize `f` starting from `x0`.
pub fn minimize<const N: usize, F>(f: F, x0: SVector<f64, N>, cfg: &NelderMeadConfig) -> Minimum<N>
where
    F: Fn(&SVector<f64, N>) -> f64,
{
    let eval = |x: &SVector<f64, N>| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut best = run_simplex(&eval, x0, cfg);
    for _ in 0..cfg.restarts {
        let next = run_simplex(&eval, best.x, cfg);
        let improvement = best.value - next.value;
        let iterations = best.iterations + next.iterations;
        if next.value < best.value {
            best = next;
        }
        best.iterations = iterations;
        if improvement <= cfg.fatol {
            break;
        }
    }
    best
}

fn run_simplex<const N: usize, F>(
    f: &F,
    x0: SVector<f64, N>,
    cfg: &NelderMeadConfig,
) -> Minimum<N>
where
    F: Fn(&SVector<f64, N>) -> f64,
{
    let mut simplex: Vec<(SVector<f64, N>, f64)> = Vec::with_capacity(N + 1);
    simplex.push((x0, f(&x0)));
    for i in 0..N {
        let mut v = x0;
        v[i] = if v[i] != 0.0 {
            v[i] * (1.0 + NONZERO_STEP)
        } else {
            ZERO_STEP
        };
        simplex.push((v, f(&v)));
    }

    let mut iterations = 0usize;
    let mut converged = false;
    while iterations < cfg.max_iters {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (best_x, best_f) = simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .map(|(x, _)| (x - best_x).amax())
            .fold(0.0f64, f64::max);
        let f_spread = simplex[1..]
            .iter()
            .map(|(_, v)| (v - best_f).abs())
            .fold(0.0f64, f64::max);
        if x_spread <= cfg.xatol && f_spread <= cfg.fatol {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid = simplex[..N]
            .iter()
            .fold(SVector::<f64, N>::zeros(), |acc, (x, _)| acc + x)
            / N as f64;
        let (worst_x, worst_f) = simplex[N];

        let xr = centroid + (centroid - worst_x) * REFLECT;
        let fr = f(&xr);

        if fr < simplex[0].1 {
            let xe = centroid + (xr - centroid) * EXPAND;
            let fe = f(&xe);
            simplex[N] = if fe < fr { (xe, fe) } else { (xr, fr) };
            continue;
        }
        if fr < simplex[N - 1].1 {
            simplex[N] = (xr, fr);
            continue;
        }

        let accepted = if fr < worst_f {
            let xc = centroid + (xr - centroid) * CONTRACT;
            let fc = f(&xc);
            (fc <= fr).then_some((xc, fc))
        } else {
            let xc = centroid + (worst_x - centroid) * CONTRACT;
            let fc = f(&xc);
            (fc < worst_f).then_some((xc, fc))
        };

        match accepted {
            Some(vertex) => simplex[N] = vertex,
            None => {
                let anchor = simplex[0].0;
                for vertex in simplex.iter_mut().skip(1) {
                    let x = anchor + (vertex.0 - anchor) * SHRINK;
                    *vertex = (x, f(&x));
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    Minimum {
        x: simplex[0].0,
        value: simplex[0].1,
        iterations,
        converged,
    }
}
