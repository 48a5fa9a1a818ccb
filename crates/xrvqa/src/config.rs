//! Sweep configuration.
//!
//! Loaded from JSON; every field is optional and falls back to the clinical
//! defaults (full gantry rotation in 30° steps, 19 energies from 245 MeV).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::beam::{delivery_order, BeamKey};
use crate::profile::ProfileFitConfig;
use crate::tolerance::ToleranceLimits;

/// Gantry angles in delivery order (degrees).
pub fn default_gantry_angles() -> Vec<i32> {
    (0..12).map(|i| 180 - 30 * i).collect()
}

/// Energies in delivery order (MeV).
pub fn default_energies() -> Vec<i32> {
    let mut e = vec![245, 240];
    e.extend((70..=230).rev().step_by(10));
    e
}

/// Settings for one QA sweep.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Gantry angles, outer delivery loop.
    pub gantry_angles: Vec<i32>,
    /// Energies, inner delivery loop.
    pub energies: Vec<i32>,
    /// Threshold (% of max) for the marker shadow in the difference image.
    pub shadow_threshold_pct: f64,
    /// Threshold (% of max) for the entry spot region.
    pub centroid_threshold_pct: f64,
    /// Reference marker position in device coordinates (mm).
    pub target_mm: [f64; 3],
    /// Files exported per beam (entry, exit, bitmap).
    pub files_per_beam: usize,
    pub entry_extension: String,
    pub exit_extension: String,
    pub profile: ProfileFitConfig,
    /// Displacement action and suspension limits.
    pub tolerance: ToleranceLimits,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            gantry_angles: default_gantry_angles(),
            energies: default_energies(),
            shadow_threshold_pct: 50.0,
            centroid_threshold_pct: 50.0,
            target_mm: [0.0, 0.0, 145.0],
            files_per_beam: 3,
            entry_extension: "csv".to_string(),
            exit_extension: "txt".to_string(),
            profile: ProfileFitConfig::default(),
            tolerance: ToleranceLimits::default(),
        }
    }
}

/// Configuration load or validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config JSON {}: {}", path.display(), source)
            }
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl SweepConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.gantry_angles.is_empty() {
            return invalid("gantry_angles must not be empty");
        }
        if self.energies.is_empty() {
            return invalid("energies must not be empty");
        }
        if has_duplicates(&self.gantry_angles) {
            return invalid("gantry_angles must be unique");
        }
        if has_duplicates(&self.energies) {
            return invalid("energies must be unique");
        }
        for (name, pct) in [
            ("shadow_threshold_pct", self.shadow_threshold_pct),
            ("centroid_threshold_pct", self.centroid_threshold_pct),
        ] {
            if !(pct > 0.0 && pct < 100.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in (0, 100), got {}",
                    name, pct
                )));
            }
        }
        if self.files_per_beam == 0 {
            return invalid("files_per_beam must be >= 1");
        }
        if self.entry_extension == self.exit_extension {
            return invalid("entry_extension and exit_extension must differ");
        }
        let [lo, hi] = self.profile.plausible_sigma_mm;
        if !(lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo <= hi) {
            return invalid("profile.plausible_sigma_mm must be an ordered, non-negative range");
        }
        let t = &self.tolerance;
        if !(t.majority_fraction > 0.0 && t.majority_fraction <= 1.0) {
            return invalid("tolerance.majority_fraction must be in (0, 1]");
        }
        if t.count_min == 0 {
            return invalid("tolerance.count_min must be >= 1");
        }
        Ok(())
    }

    /// Number of beams in a full sweep.
    pub fn n_beams(&self) -> usize {
        self.gantry_angles.len() * self.energies.len()
    }

    /// All beams in delivery order.
    pub fn beams(&self) -> Vec<BeamKey> {
        delivery_order(&self.gantry_angles, &self.energies)
    }
}

fn has_duplicates(values: &[i32]) -> bool {
    let mut seen = HashSet::new();
    values.iter().any(|v| !seen.insert(*v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_clinical_sweep() {
        let cfg = SweepConfig::default();
        assert_eq!(cfg.gantry_angles.first(), Some(&180));
        assert_eq!(cfg.gantry_angles.last(), Some(&-150));
        assert_eq!(cfg.gantry_angles.len(), 12);
        assert_eq!(&cfg.energies[..4], &[245, 240, 230, 220]);
        assert_eq!(cfg.energies.last(), Some(&70));
        assert_eq!(cfg.energies.len(), 19);
        assert_eq!(cfg.n_beams(), 228);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: SweepConfig =
            serde_json::from_str(r#"{"gantry_angles": [0, 90], "profile": {"margin_px": 10}}"#)
                .unwrap();
        assert_eq!(cfg.gantry_angles, vec![0, 90]);
        assert_eq!(cfg.energies, default_energies());
        assert_eq!(cfg.profile.margin_px, 10);
        assert_eq!(cfg.profile.seed_amplitude, 0.972);
        assert_eq!(cfg.beams()[0], BeamKey::new(0, 245));
        assert_eq!(cfg.tolerance.suspension_mm, 2.5);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad = [
            SweepConfig {
                energies: vec![],
                ..Default::default()
            },
            SweepConfig {
                gantry_angles: vec![0, 30, 0],
                ..Default::default()
            },
            SweepConfig {
                shadow_threshold_pct: 100.0,
                ..Default::default()
            },
            SweepConfig {
                centroid_threshold_pct: 0.0,
                ..Default::default()
            },
            SweepConfig {
                files_per_beam: 0,
                ..Default::default()
            },
            SweepConfig {
                exit_extension: "csv".into(),
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"energies": [100], "shadow_threshold_pct": 40}"#).unwrap();
        let cfg = SweepConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.energies, vec![100]);
        assert_eq!(cfg.shadow_threshold_pct, 40.0);

        std::fs::write(&path, r#"{"energies": []}"#).unwrap();
        assert!(matches!(
            SweepConfig::from_json_file(&path),
            Err(ConfigError::Invalid(_))
        ));
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SweepConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            SweepConfig::from_json_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
