//! Shift repeatability across repeated irradiations.
//!
//! Several shift result files (same beams, different runs) are compared per
//! beam; the spread is `max - min` in each axis.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::beam::BeamKey;
use crate::persist::{read_beam_map, PersistError};

pub const DEFAULT_TOLERANCE_MM: f64 = 0.5;

/// Per-axis spread of one beam's shift over the runs that measured it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftSpread {
    /// `[max - min]` per axis (mm).
    pub spread_mm: [f64; 2],
    pub n_runs: usize,
}

impl ShiftSpread {
    pub fn exceeds(&self, tolerance_mm: f64) -> bool {
        self.spread_mm.iter().any(|s| *s >= tolerance_mm)
    }
}

/// Spread per beam; beams measured in fewer than two runs are skipped.
pub fn shift_spreads(runs: &[BTreeMap<BeamKey, [f64; 2]>]) -> BTreeMap<BeamKey, ShiftSpread> {
    let mut values: BTreeMap<BeamKey, Vec<[f64; 2]>> = BTreeMap::new();
    for run in runs {
        for (k, s) in run {
            values.entry(*k).or_default().push(*s);
        }
    }
    values
        .into_iter()
        .filter(|(_, v)| v.len() > 1)
        .map(|(k, v)| {
            let axis = |i: usize| {
                let (lo, hi) = v
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                        (lo.min(s[i]), hi.max(s[i]))
                    });
                hi - lo
            };
            let spread = ShiftSpread {
                spread_mm: [axis(0), axis(1)],
                n_runs: v.len(),
            };
            (k, spread)
        })
        .collect()
}

/// Beams whose spread reaches `tolerance_mm` in either axis.
pub fn flagged(spreads: &BTreeMap<BeamKey, ShiftSpread>, tolerance_mm: f64) -> Vec<BeamKey> {
    spreads
        .iter()
        .filter(|(_, s)| s.exceeds(tolerance_mm))
        .map(|(k, _)| *k)
        .collect()
}

/// Read every regular file in `dir` as a shift result map, in name order.
pub fn load_shift_runs(
    dir: &Path,
) -> Result<Vec<(PathBuf, BTreeMap<BeamKey, [f64; 2]>)>, PersistError> {
    let io_err = |source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    paths
        .into_iter()
        .map(|p| {
            let map = read_beam_map(&p)?;
            Ok((p, map))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::persist::write_beam_map;

    fn run(entries: &[((i32, i32), [f64; 2])]) -> BTreeMap<BeamKey, [f64; 2]> {
        entries
            .iter()
            .map(|&((ga, en), s)| (BeamKey::new(ga, en), s))
            .collect()
    }

    #[test]
    fn spread_is_max_minus_min_per_axis() {
        let runs = vec![
            run(&[((0, 100), [0.1, -0.2]), ((0, 90), [0.0, 0.0])]),
            run(&[((0, 100), [0.4, -0.1])]),
            run(&[((0, 100), [0.2, 0.5])]),
        ];
        let spreads = shift_spreads(&runs);
        assert_eq!(spreads.len(), 1, "single-run beams are skipped");
        let s = spreads[&BeamKey::new(0, 100)];
        assert_eq!(s.n_runs, 3);
        assert_abs_diff_eq!(s.spread_mm[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(s.spread_mm[1], 0.7, epsilon = 1e-12);
        assert_eq!(flagged(&spreads, DEFAULT_TOLERANCE_MM), vec![BeamKey::new(0, 100)]);
        assert!(flagged(&spreads, 0.8).is_empty());
    }

    #[test]
    fn tolerance_is_inclusive() {
        let s = ShiftSpread {
            spread_mm: [0.5, 0.0],
            n_runs: 2,
        };
        assert!(s.exceeds(0.5));
        assert!(!s.exceeds(0.51));
    }

    #[test]
    fn loads_all_runs_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_beam_map(&dir.path().join("b.txt"), &run(&[((30, 70), [0.3, 0.0])])).unwrap();
        write_beam_map(&dir.path().join("a.txt"), &run(&[((30, 70), [0.0, 0.0])])).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let runs = load_shift_runs(dir.path()).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].0.ends_with("a.txt"));
        let maps: Vec<_> = runs.into_iter().map(|(_, m)| m).collect();
        let spreads = shift_spreads(&maps);
        assert_abs_diff_eq!(spreads[&BeamKey::new(30, 70)].spread_mm[0], 0.3, epsilon = 1e-12);
    }
}
