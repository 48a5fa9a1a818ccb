//! xrvqa: beam-spot QA analysis for gantry proton therapy.
//!
//! A scintillator device with a fixed ball-bearing marker records an entry
//! and an exit spot image for every beam of a sweep over gantry angles and
//! energies. The analysis stages are:
//!
//! 1. **Load** – parse the device's delimited text export into an intensity
//!    grid plus pixel pitch, and read vendor metadata (diameter, arc/radial
//!    widths).
//! 2. **Region** – threshold at a percentage of the maximum, label
//!    8-connected components and keep the one with the largest equivalent
//!    diameter.
//! 3. **Shift** – locate the marker shadow in `entry - exit` and report
//!    image center minus shadow centroid in mm.
//! 4. **Profile** – fit a Gaussian to a line profile through the spot center
//!    at a given angle, with one refit when the width is implausible.
//! 5. **Sweep** – map numbered files to beams in delivery order, analyse each
//!    beam independently and collect per-beam results.
//!
//! Results can be persisted as JSON keyed by `GA<angle>E<energy>`, checked
//! against displacement tolerances and compared across repeated runs.
//!
//! Shifts leave the analysis in image coordinates (y down). The
//! beam's-eye-view conversion ([`image_to_bev`]) is applied once by the sweep.

mod beam;
mod config;
mod dataset;
mod error;
mod persist;
mod profile;
mod region;
mod repeatability;
mod shift;
mod spot_file;
mod sweep;
mod tolerance;

#[cfg(test)]
mod test_utils;

pub use beam::{delivery_order, BeamKey, BeamKeyParseError};
pub use config::{default_energies, default_gantry_angles, ConfigError, SweepConfig};
pub use dataset::{scan_directory, BeamPlan, DataSet, DataSetError, PlannedBeam};
pub use error::AnalysisError;
pub use persist::{
    create_results_dir, read_beam_map, successes, write_beam_map, write_sweep_results,
    PersistError, ARC_RADIAL_FILE, DIAMETERS_FILE, EQUIVALENT_DIAMETERS_FILE, FAILURES_FILE,
    RESULTS_DIR, SHIFTS_FILE, SIGMAS_FILE,
};
pub use profile::{
    bilinear_sample, chord_through_center, extract_profile, fit_gaussian, fit_normalized_profile,
    fit_profile, initial_seed, minimize, sample_chord, sigma_along_angle, sum_squared_residuals,
    Chord, GaussianFit, GaussianParams, Minimum, NelderMeadConfig, Profile, ProfileFit,
    ProfileFitConfig,
};
pub use region::{
    detect_dominant_region, equivalent_diameter, regions_from_mask, spot_equivalent_diameter_mm,
    threshold_mask, Region, RegionDetection,
};
pub use repeatability::{
    flagged, load_shift_runs, shift_spreads, ShiftSpread, DEFAULT_TOLERANCE_MM,
};
pub use shift::{
    image_to_bev, measure_shift, measure_shift_files, pixel_shift_to_mm, ShiftMeasurement,
};
pub use spot_file::{load_spot_image, IntensityImage, SpotFile, SpotImage};
pub use sweep::{
    analyze_beam, run_full_sweep, run_sweep, spot_sigmas, BeamAnalysis, BeamMap, CancelToken,
    SweepResults,
};
pub use tolerance::{total_displacement, GantryRow, ToleranceLimits, ToleranceTable, Verdict};
