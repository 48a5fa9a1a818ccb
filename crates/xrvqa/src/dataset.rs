//! Acquisition directory discovery and beam-to-file mapping.
//!
//! The device names its exports with an increasing numeric stem per delivered
//! spot (`001.csv`, `001.txt`, `001.bmp`, `002.csv`, ...). Files carry no beam
//! identity, so the mapping is positional: the i-th stem in numeric order is
//! the i-th beam in delivery order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::beam::{delivery_order, BeamKey};
use crate::config::{ConfigError, SweepConfig};

/// Dataset discovery failure. Fatal for the whole sweep.
#[derive(Debug)]
pub enum DataSetError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File counts do not match a full sweep.
    DataSetIncomplete {
        /// `angles * energies * files_per_beam`.
        expected: usize,
        /// Numerically named files found.
        found: usize,
        /// Distinct numeric stems found.
        unique: usize,
    },
    /// Stem count differs from the number of beams.
    StemCountMismatch { beams: usize, stems: usize },
    /// The sweep config failed validation.
    Config(ConfigError),
}

impl From<ConfigError> for DataSetError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl std::fmt::Display for DataSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot list {}: {}", path.display(), source),
            Self::DataSetIncomplete {
                expected,
                found,
                unique,
            } => write!(
                f,
                "incomplete dataset: expected {} beam files, found {} ({} unique stems)",
                expected, found, unique
            ),
            Self::StemCountMismatch { beams, stems } => {
                write!(f, "{} beams but {} file stems", beams, stems)
            }
            Self::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DataSetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// Numerically named beam files found in one directory.
#[derive(Debug, Clone)]
pub struct DataSet {
    dir: PathBuf,
    /// Distinct stems, sorted by integer value.
    stems: Vec<String>,
    /// Number of files with a numeric stem.
    n_beam_files: usize,
}

impl DataSet {
    /// Build from a list of file names (no directory access).
    pub fn from_file_names<I, S>(dir: impl Into<PathBuf>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut n_beam_files = 0;
        let mut unique = BTreeSet::new();
        for name in names {
            if let Some(stem) = numeric_stem(name.as_ref()) {
                n_beam_files += 1;
                unique.insert(stem.to_string());
            }
        }
        let mut stems: Vec<String> = unique.into_iter().collect();
        stems.sort_by_key(|s| stem_value(s));
        Self {
            dir: dir.into(),
            stems,
            n_beam_files,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stems(&self) -> &[String] {
        &self.stems
    }

    pub fn n_beam_files(&self) -> usize {
        self.n_beam_files
    }

    /// Validate `cfg` and check the file counts against a full sweep of it.
    pub fn check_complete(&self, cfg: &SweepConfig) -> Result<(), DataSetError> {
        cfg.validate()?;
        let expected = cfg.n_beams() * cfg.files_per_beam;
        let unique = self.stems.len();
        if self.n_beam_files != expected || unique != self.n_beam_files / cfg.files_per_beam {
            return Err(DataSetError::DataSetIncomplete {
                expected,
                found: self.n_beam_files,
                unique,
            });
        }
        Ok(())
    }

    /// Check completeness and map stems to beams.
    pub fn plan(&self, cfg: &SweepConfig) -> Result<BeamPlan, DataSetError> {
        self.check_complete(cfg)?;
        BeamPlan::new(&cfg.gantry_angles, &cfg.energies, &self.stems)
    }

    pub fn entry_path(&self, stem: &str, cfg: &SweepConfig) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, cfg.entry_extension))
    }

    pub fn exit_path(&self, stem: &str, cfg: &SweepConfig) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, cfg.exit_extension))
    }
}

/// List the regular files of `dir` and collect numeric stems.
pub fn scan_directory(dir: &Path) -> Result<DataSet, DataSetError> {
    let io_err = |source| DataSetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    let ds = DataSet::from_file_names(dir, &names);
    tracing::info!(
        "{}: {} files, {} beam files, {} unique stems",
        dir.display(),
        names.len(),
        ds.n_beam_files,
        ds.stems.len()
    );
    Ok(ds)
}

/// One beam and the file stem holding its exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBeam {
    pub key: BeamKey,
    pub stem: String,
}

/// Positional beam-to-stem mapping in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamPlan {
    beams: Vec<PlannedBeam>,
}

impl BeamPlan {
    pub fn new(
        gantry_angles: &[i32],
        energies: &[i32],
        stems: &[String],
    ) -> Result<Self, DataSetError> {
        let keys = delivery_order(gantry_angles, energies);
        if keys.len() != stems.len() {
            return Err(DataSetError::StemCountMismatch {
                beams: keys.len(),
                stems: stems.len(),
            });
        }
        let beams = keys
            .into_iter()
            .zip(stems)
            .map(|(key, stem)| PlannedBeam {
                key,
                stem: stem.clone(),
            })
            .collect();
        Ok(Self { beams })
    }

    pub fn beams(&self) -> &[PlannedBeam] {
        &self.beams
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    pub fn stem(&self, key: BeamKey) -> Option<&str> {
        self.beams
            .iter()
            .find(|b| b.key == key)
            .map(|b| b.stem.as_str())
    }
}

/// Stem of `name` when it is made of ASCII digits only.
fn numeric_stem(name: &str) -> Option<&str> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    (!stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit())).then_some(stem)
}

/// Integer value of a digit stem; `u128` so long stems do not overflow.
fn stem_value(stem: &str) -> u128 {
    stem.parse().unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stems(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_mapping_follows_delivery_order() {
        let plan = BeamPlan::new(&[180, 150], &[245, 240], &stems(&["001", "002", "003", "004"]))
            .unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.stem(BeamKey::new(180, 245)), Some("001"));
        assert_eq!(plan.stem(BeamKey::new(180, 240)), Some("002"));
        assert_eq!(plan.stem(BeamKey::new(150, 245)), Some("003"));
        assert_eq!(plan.stem(BeamKey::new(150, 240)), Some("004"));
        assert_eq!(plan.stem(BeamKey::new(0, 245)), None);
    }

    #[test]
    fn plan_rejects_wrong_stem_count() {
        let err = BeamPlan::new(&[0], &[100, 90], &stems(&["1"])).unwrap_err();
        assert!(matches!(
            err,
            DataSetError::StemCountMismatch { beams: 2, stems: 1 }
        ));
    }

    #[test]
    fn stems_are_numeric_unique_and_sorted_by_value() {
        let ds = DataSet::from_file_names(
            "/data",
            [
                "10.csv", "10.txt", "9.csv", "9.txt", "notes.txt", "0011.bmp", "a1.csv", "README",
            ],
        );
        assert_eq!(ds.stems(), &["9", "10", "0011"]);
        assert_eq!(ds.n_beam_files(), 5);
        assert_eq!(ds.entry_path("9", &SweepConfig::default()), Path::new("/data/9.csv"));
        assert_eq!(ds.exit_path("9", &SweepConfig::default()), Path::new("/data/9.txt"));
    }

    fn small_cfg() -> SweepConfig {
        SweepConfig {
            gantry_angles: vec![180, 150],
            energies: vec![245, 240],
            ..Default::default()
        }
    }

    fn names(n: usize, exts: &[&str]) -> Vec<String> {
        (1..=n)
            .flat_map(|i| exts.iter().map(move |e| format!("{:03}.{}", i, e)))
            .collect()
    }

    #[test]
    fn completeness_check() {
        let cfg = small_cfg();
        let full = DataSet::from_file_names("/d", names(4, &["csv", "txt", "bmp"]));
        assert!(full.check_complete(&cfg).is_ok());
        let plan = full.plan(&cfg).unwrap();
        assert_eq!(plan.beams()[3].stem, "004");

        let missing = DataSet::from_file_names("/d", names(3, &["csv", "txt", "bmp"]));
        assert!(matches!(
            missing.check_complete(&cfg),
            Err(DataSetError::DataSetIncomplete {
                expected: 12,
                found: 9,
                unique: 3
            })
        ));

        // Right file count, wrong stem spread.
        let mut skewed = names(2, &["csv", "txt", "bmp"]);
        skewed.extend(names(2, &["png", "jpg", "dat"]));
        let skewed = DataSet::from_file_names("/d", skewed);
        assert!(skewed.check_complete(&cfg).is_err());
    }

    #[test]
    fn invalid_config_is_rejected_before_counting() {
        let ds = DataSet::from_file_names("/d", Vec::<String>::new());
        let cfg = SweepConfig {
            files_per_beam: 0,
            ..small_cfg()
        };
        assert!(matches!(
            ds.check_complete(&cfg),
            Err(DataSetError::Config(ConfigError::Invalid(_)))
        ));
        assert!(matches!(ds.plan(&cfg), Err(DataSetError::Config(_))));
    }

    #[test]
    fn scans_directory_files_only() {
        let dir = tempfile::tempdir().unwrap();
        for n in names(4, &["csv", "txt", "bmp"]) {
            std::fs::write(dir.path().join(n), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("005")).unwrap();
        std::fs::write(dir.path().join("log.txt"), "").unwrap();
        let ds = scan_directory(dir.path()).unwrap();
        assert_eq!(ds.n_beam_files(), 12);
        assert_eq!(ds.stems().len(), 4);
        assert!(ds.plan(&small_cfg()).is_ok());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = scan_directory(Path::new("/nonexistent/xrv")).unwrap_err();
        assert!(matches!(err, DataSetError::Io { .. }));
    }
}
