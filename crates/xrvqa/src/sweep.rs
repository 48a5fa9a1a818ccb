//! Full-sweep orchestration.
//!
//! Every planned beam is analysed independently. A failure in one analysis of
//! one beam is stored against that beam's key and the sweep moves on; only
//! dataset discovery problems abort the run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::beam::BeamKey;
use crate::config::SweepConfig;
use crate::dataset::{scan_directory, BeamPlan, DataSet, DataSetError};
use crate::error::AnalysisError;
use crate::profile::{sigma_along_angle, ProfileFitConfig};
use crate::region::spot_equivalent_diameter_mm;
use crate::shift::{image_to_bev, measure_shift, ShiftMeasurement};
use crate::spot_file::{load_spot_image, SpotFile, SpotImage};

/// Per-beam outcome of one analysis kind.
pub type BeamMap<T> = BTreeMap<BeamKey, Result<T, AnalysisError>>;

/// Shared flag checked between beams; cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// All analyses of a single beam.
#[derive(Debug, Clone)]
pub struct BeamAnalysis {
    /// Shadow-relative shift, image coordinates.
    pub shift: Result<ShiftMeasurement, AnalysisError>,
    /// Vendor-reported entry spot diameter (mm).
    pub diameter: Result<f64, AnalysisError>,
    /// Equivalent diameter of the thresholded entry spot (mm).
    pub equivalent_diameter: Result<f64, AnalysisError>,
    /// `[sigma_x, sigma_y]` (mm) in spot coordinates.
    pub sigmas: Result<[f64; 2], AnalysisError>,
    /// Vendor-reported `[arc, radial]` entry widths (mm).
    pub arc_radial: Result<[f64; 2], AnalysisError>,
}

impl BeamAnalysis {
    /// Failed analyses as `(kind, error)`.
    pub fn errors(&self) -> Vec<(&'static str, &AnalysisError)> {
        let mut out = Vec::new();
        if let Err(e) = &self.shift {
            out.push(("shift", e));
        }
        if let Err(e) = &self.diameter {
            out.push(("diameter", e));
        }
        if let Err(e) = &self.equivalent_diameter {
            out.push(("equivalent_diameter", e));
        }
        if let Err(e) = &self.sigmas {
            out.push(("sigmas", e));
        }
        if let Err(e) = &self.arc_radial {
            out.push(("arc_radial", e));
        }
        out
    }
}

/// Results of one sweep, one map per analysis kind.
#[derive(Debug, Clone, Default)]
pub struct SweepResults {
    /// Shifts in image coordinates.
    pub shifts: BeamMap<ShiftMeasurement>,
    /// Shifts `[x, y]` (mm) in beam's-eye-view coordinates.
    pub shifts_bev: BeamMap<[f64; 2]>,
    pub diameters: BeamMap<f64>,
    pub equivalent_diameters: BeamMap<f64>,
    pub sigmas: BeamMap<[f64; 2]>,
    pub arc_radial: BeamMap<[f64; 2]>,
    /// Beams in the plan.
    pub n_planned: usize,
    /// The sweep stopped early; only completed beams are present.
    pub cancelled: bool,
}

impl SweepResults {
    fn insert(&mut self, key: BeamKey, beam: BeamAnalysis) {
        self.shifts_bev.insert(
            key,
            beam.shift.as_ref().map(|m| image_to_bev(m.shift_mm)).map_err(Clone::clone),
        );
        self.shifts.insert(key, beam.shift);
        self.diameters.insert(key, beam.diameter);
        self.equivalent_diameters.insert(key, beam.equivalent_diameter);
        self.sigmas.insert(key, beam.sigmas);
        self.arc_radial.insert(key, beam.arc_radial);
    }

    /// Beams analysed (successfully or not).
    pub fn n_completed(&self) -> usize {
        self.shifts.len()
    }

    /// All planned beams analysed without cancellation.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.n_completed() == self.n_planned
    }

    /// Failure messages per beam and analysis kind.
    pub fn failures(&self) -> BTreeMap<BeamKey, BTreeMap<String, String>> {
        let mut out: BTreeMap<BeamKey, BTreeMap<String, String>> = BTreeMap::new();
        let mut collect = |kind: &str, errs: Vec<(BeamKey, &AnalysisError)>| {
            for (key, e) in errs {
                out.entry(key)
                    .or_default()
                    .insert(kind.to_string(), e.to_string());
            }
        };
        collect("shift", errors_of(&self.shifts));
        collect("diameter", errors_of(&self.diameters));
        collect("equivalent_diameter", errors_of(&self.equivalent_diameters));
        collect("sigmas", errors_of(&self.sigmas));
        collect("arc_radial", errors_of(&self.arc_radial));
        out
    }
}

fn errors_of<T>(map: &BeamMap<T>) -> Vec<(BeamKey, &AnalysisError)> {
    map.iter()
        .filter_map(|(k, r)| r.as_ref().err().map(|e| (*k, e)))
        .collect()
}

/// Spot sigmas `[x, y]` for a beam at `gantry_angle`.
///
/// Profiles are taken at `-gantry_angle` and `90 - gantry_angle` image
/// degrees, which keeps them aligned with the spot axes as the gantry turns.
pub fn spot_sigmas(
    entry: &SpotImage,
    gantry_angle: i32,
    cfg: &ProfileFitConfig,
) -> Result<[f64; 2], AnalysisError> {
    let pitch = entry.pitch_mm();
    let ga = gantry_angle as f64;
    let x = sigma_along_angle(entry, -ga, pitch, cfg)?;
    let y = sigma_along_angle(entry, 90.0 - ga, pitch, cfg)?;
    if !cfg.is_plausible(x) || !cfg.is_plausible(y) {
        tracing::warn!("sigma pair out of range: x {:.3} mm, y {:.3} mm", x, y);
    }
    Ok([x, y])
}

/// Run every analysis for one beam.
pub fn analyze_beam(
    key: BeamKey,
    entry_path: &Path,
    exit_path: &Path,
    cfg: &SweepConfig,
) -> BeamAnalysis {
    let entry_file = SpotFile::read(entry_path);
    let entry = entry_file
        .as_ref()
        .map_err(Clone::clone)
        .and_then(SpotFile::image);

    let shift = entry.as_ref().map_err(Clone::clone).and_then(|entry| {
        let exit = load_spot_image(exit_path)?;
        measure_shift(entry, &exit, cfg.shadow_threshold_pct)
    });
    let diameter = entry_file
        .as_ref()
        .map_err(Clone::clone)
        .and_then(SpotFile::diameter);
    let arc_radial = entry_file
        .as_ref()
        .map_err(Clone::clone)
        .and_then(SpotFile::arc_radial_widths)
        .map(|(arc, radial)| [arc, radial]);
    let equivalent_diameter = entry
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|entry| spot_equivalent_diameter_mm(entry, cfg.centroid_threshold_pct));
    let sigmas = entry
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|entry| spot_sigmas(entry, key.gantry_angle, &cfg.profile));

    BeamAnalysis {
        shift,
        diameter,
        equivalent_diameter,
        sigmas,
        arc_radial,
    }
}

/// Analyse every beam of `plan` with files from `dataset`.
pub fn run_sweep(
    dataset: &DataSet,
    plan: &BeamPlan,
    cfg: &SweepConfig,
    cancel: &CancelToken,
) -> SweepResults {
    let total = plan.len();
    let mut results = SweepResults {
        n_planned: total,
        ..Default::default()
    };

    for (i, beam) in plan.beams().iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!("sweep cancelled after {}/{} beams", i, total);
            results.cancelled = true;
            break;
        }
        let span = tracing::info_span!("beam", key = %beam.key, stem = %beam.stem);
        let _guard = span.enter();
        tracing::info!("[{}/{}] {} ({})", i + 1, total, beam.key, beam.stem);

        let analysis = analyze_beam(
            beam.key,
            &dataset.entry_path(&beam.stem, cfg),
            &dataset.exit_path(&beam.stem, cfg),
            cfg,
        );
        for (kind, e) in analysis.errors() {
            tracing::warn!("{} failed: {}", kind, e);
        }
        results.insert(beam.key, analysis);
    }

    let n_failed = results.failures().len();
    tracing::info!(
        "sweep finished: {}/{} beams analysed, {} with failures",
        results.n_completed(),
        total,
        n_failed
    );
    results
}

/// Discover, plan and analyse a full acquisition directory.
pub fn run_full_sweep(
    dir: &Path,
    cfg: &SweepConfig,
    cancel: &CancelToken,
) -> Result<SweepResults, DataSetError> {
    let dataset = scan_directory(dir)?;
    let plan = dataset.plan(cfg)?;
    Ok(run_sweep(&dataset, &plan, cfg, cancel))
}
