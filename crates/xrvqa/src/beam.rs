//! Beam identity within an acquisition sweep.
//!
//! A beam is identified by its gantry angle and energy. Internally this is the
//! structured [`BeamKey`]; the textual `GA<angle>E<energy>` form is used only at
//! serialization boundaries (result files, report tables).

use std::fmt;
use std::str::FromStr;

/// Composite beam identity `(gantry angle in degrees, energy in MeV)`.
///
/// Ordering is lexicographic on `(gantry_angle, energy)`; it is a map order,
/// not the delivery order (see [`delivery_order`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeamKey {
    /// Gantry angle (degrees).
    pub gantry_angle: i32,
    /// Beam energy (MeV).
    pub energy: i32,
}

impl BeamKey {
    pub fn new(gantry_angle: i32, energy: i32) -> Self {
        Self {
            gantry_angle,
            energy,
        }
    }
}

impl fmt::Display for BeamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GA{}E{}", self.gantry_angle, self.energy)
    }
}

/// Error returned when a string is not a `GA<angle>E<energy>` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamKeyParseError(pub String);

impl fmt::Display for BeamKeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid beam key '{}' (expected GA<angle>E<energy>)", self.0)
    }
}

impl std::error::Error for BeamKeyParseError {}

impl FromStr for BeamKey {
    type Err = BeamKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BeamKeyParseError(s.to_string());
        let rest = s.strip_prefix("GA").ok_or_else(err)?;
        let (angle, energy) = rest.rsplit_once('E').ok_or_else(err)?;
        Ok(Self {
            gantry_angle: angle.parse().map_err(|_| err())?,
            energy: energy.parse().map_err(|_| err())?,
        })
    }
}

impl serde::Serialize for BeamKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for BeamKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Beam keys in physical delivery order: angles outer loop, energies inner loop.
pub fn delivery_order(gantry_angles: &[i32], energies: &[i32]) -> Vec<BeamKey> {
    gantry_angles
        .iter()
        .flat_map(|&ga| energies.iter().map(move |&en| BeamKey::new(ga, en)))
        .collect()
}
