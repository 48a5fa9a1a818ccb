//! Result files.
//!
//! Each analysis kind is written as one JSON object keyed by
//! `GA<angle>E<energy>`. Only successful beams appear in those files; failed
//! beams are collected in a separate failures file with one message per
//! failed analysis.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::beam::BeamKey;
use crate::sweep::{BeamMap, SweepResults};

pub const SHIFTS_FILE: &str = "results_shifts.txt";
pub const DIAMETERS_FILE: &str = "results_spot_diameters.txt";
pub const EQUIVALENT_DIAMETERS_FILE: &str = "results_equivalent_diameters.txt";
pub const SIGMAS_FILE: &str = "results_spot_sigmas.txt";
pub const ARC_RADIAL_FILE: &str = "results_arc_radial.txt";
pub const FAILURES_FILE: &str = "results_failures.txt";

/// Default name of the per-run results directory.
pub const RESULTS_DIR: &str = "full_results";

const MAX_RESULTS_DIRS: usize = 10_000;

#[derive(Debug)]
pub enum PersistError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Json { path, source } => {
                write!(f, "{}: invalid result JSON: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

/// Successful entries of a beam map.
pub fn successes<T: Clone>(map: &BeamMap<T>) -> BTreeMap<BeamKey, T> {
    map.iter()
        .filter_map(|(k, r)| r.as_ref().ok().map(|v| (*k, v.clone())))
        .collect()
}

pub fn write_beam_map<T: Serialize>(
    path: &Path,
    map: &BTreeMap<BeamKey, T>,
) -> Result<(), PersistError> {
    let json = serde_json::to_string(map).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|e| PersistError::io(path, e))
}

pub fn read_beam_map<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<BeamKey, T>, PersistError> {
    let data = std::fs::read_to_string(path).map_err(|e| PersistError::io(path, e))?;
    serde_json::from_str(&data).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Create `<parent>/<base>`, or `<base>2`, `<base>3`, ... if taken.
pub fn create_results_dir(parent: &Path, base: &str) -> Result<PathBuf, PersistError> {
    for i in 1..=MAX_RESULTS_DIRS {
        let name = if i == 1 {
            base.to_string()
        } else {
            format!("{}{}", base, i)
        };
        let dir = parent.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(PersistError::io(&dir, e)),
        }
    }
    Err(PersistError::io(
        &parent.join(base),
        std::io::Error::new(ErrorKind::AlreadyExists, "no free results directory name"),
    ))
}

/// Write every result file of a sweep into `dir`; returns the written paths.
///
/// Shifts are written in beam's-eye-view coordinates.
pub fn write_sweep_results(dir: &Path, results: &SweepResults) -> Result<Vec<PathBuf>, PersistError> {
    write_beam_map(&dir.join(SHIFTS_FILE), &successes(&results.shifts_bev))?;
    write_beam_map(&dir.join(DIAMETERS_FILE), &successes(&results.diameters))?;
    write_beam_map(
        &dir.join(EQUIVALENT_DIAMETERS_FILE),
        &successes(&results.equivalent_diameters),
    )?;
    write_beam_map(&dir.join(SIGMAS_FILE), &successes(&results.sigmas))?;
    write_beam_map(&dir.join(ARC_RADIAL_FILE), &successes(&results.arc_radial))?;
    write_beam_map(&dir.join(FAILURES_FILE), &results.failures())?;

    let written: Vec<PathBuf> = [
        SHIFTS_FILE,
        DIAMETERS_FILE,
        EQUIVALENT_DIAMETERS_FILE,
        SIGMAS_FILE,
        ARC_RADIAL_FILE,
        FAILURES_FILE,
    ]
    .iter()
    .map(|name| dir.join(name))
    .collect();
    tracing::info!("wrote {} result files to {}", written.len(), dir.display());
    Ok(written)
}
