//! Action and suspension limits on total beam displacement.
//!
//! Per gantry angle, a FAIL is raised when
//! - more than `majority_mm` is exceeded by at least `majority_fraction` of the energies,
//! - more than `count_mm` is exceeded by at least `count_min` energies,
//! - more than `any_mm` is exceeded by any energy.
//!
//! Beams beyond `suspension_mm` are listed separately. Each criterion counts
//! every beam above its own limit, including beams above higher limits and
//! suspended beams. The clinical summary printout instead puts each beam in
//! its highest bucket only and leaves suspended beams out of the action
//! counts, so its counts can be lower than the ones here.

use std::collections::BTreeMap;
use std::fmt;

use crate::beam::BeamKey;

/// Displacement limits (mm).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToleranceLimits {
    pub majority_mm: f64,
    pub majority_fraction: f64,
    pub count_mm: f64,
    pub count_min: usize,
    pub any_mm: f64,
    pub suspension_mm: f64,
}

impl Default for ToleranceLimits {
    fn default() -> Self {
        Self {
            majority_mm: 1.0,
            majority_fraction: 0.5,
            count_mm: 1.5,
            count_min: 5,
            any_mm: 2.0,
            suspension_mm: 2.5,
        }
    }
}

/// `sqrt(x² + y²)`.
pub fn total_displacement(shift_mm: [f64; 2]) -> f64 {
    shift_mm[0].hypot(shift_mm[1])
}

/// Outcome of one criterion for one gantry angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// No failure among the measured beams, but some beams are missing.
    Incomplete,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "FAIL",
            Self::Incomplete => "incomplete",
        })
    }
}

/// Tolerance results for one gantry angle.
#[derive(Debug, Clone, PartialEq)]
pub struct GantryRow {
    pub gantry_angle: i32,
    pub majority: Verdict,
    pub count: Verdict,
    pub any: Verdict,
    /// Beams above the suspension limit.
    pub suspended: Vec<BeamKey>,
    /// Beams with no shift result.
    pub missing: Vec<BeamKey>,
    /// Largest measured displacement (mm); `None` when nothing was measured.
    pub max_displacement_mm: Option<f64>,
}

impl GantryRow {
    pub fn passed(&self) -> bool {
        [self.majority, self.count, self.any]
            .iter()
            .all(|v| *v == Verdict::Pass)
            && self.suspended.is_empty()
    }
}

/// Per-gantry tolerance table.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceTable {
    pub limits: ToleranceLimits,
    pub rows: Vec<GantryRow>,
}

impl ToleranceTable {
    /// Evaluate `shifts` (mm, any consistent frame) over the configured grid.
    pub fn evaluate(
        shifts: &BTreeMap<BeamKey, [f64; 2]>,
        gantry_angles: &[i32],
        energies: &[i32],
        limits: &ToleranceLimits,
    ) -> Self {
        let rows = gantry_angles
            .iter()
            .map(|&ga| evaluate_angle(shifts, ga, energies, limits))
            .collect();
        Self {
            limits: limits.clone(),
            rows,
        }
    }

    pub fn passed(&self) -> bool {
        self.rows.iter().all(GantryRow::passed)
    }

    pub fn suspended(&self) -> Vec<BeamKey> {
        self.rows.iter().flat_map(|r| r.suspended.iter().copied()).collect()
    }

    /// Plain-text table, one line per gantry angle.
    pub fn render_text(&self) -> String {
        let l = &self.limits;
        let headers = [
            "Gantry".to_string(),
            format!("{:.0}% energies <= {} mm", l.majority_fraction * 100.0, l.majority_mm),
            format!("< {} energies > {} mm", l.count_min, l.count_mm),
            format!("No energy > {} mm", l.any_mm),
            "Max (mm)".to_string(),
        ];
        let mut lines = vec![headers.join(" | ")];
        for r in &self.rows {
            let max = r
                .max_displacement_mm
                .map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
            lines.push(format!(
                "{:>6} | {:>w1$} | {:>w2$} | {:>w3$} | {:>8}",
                r.gantry_angle,
                r.majority.to_string(),
                r.count.to_string(),
                r.any.to_string(),
                max,
                w1 = headers[1].len(),
                w2 = headers[2].len(),
                w3 = headers[3].len(),
            ));
        }
        let suspended = self.suspended();
        if !suspended.is_empty() {
            let keys: Vec<String> = suspended.iter().map(ToString::to_string).collect();
            lines.push(format!(
                "SUSPENSION: > {} mm for {}",
                l.suspension_mm,
                keys.join(", ")
            ));
        }
        for r in self.rows.iter().filter(|r| !r.missing.is_empty()) {
            lines.push(format!(
                "GA {}: {} beam(s) without a shift result",
                r.gantry_angle,
                r.missing.len()
            ));
        }
        lines.join("\n")
    }
}

fn evaluate_angle(
    shifts: &BTreeMap<BeamKey, [f64; 2]>,
    gantry_angle: i32,
    energies: &[i32],
    limits: &ToleranceLimits,
) -> GantryRow {
    let mut measured = Vec::with_capacity(energies.len());
    let mut missing = Vec::new();
    for &en in energies {
        let key = BeamKey::new(gantry_angle, en);
        match shifts.get(&key) {
            Some(s) => measured.push((key, total_displacement(*s))),
            None => missing.push(key),
        }
    }

    let above = |limit: f64| measured.iter().filter(|(_, d)| *d > limit).count();
    let verdict = |failed: bool| match (failed, missing.is_empty()) {
        (true, _) => Verdict::Fail,
        (false, true) => Verdict::Pass,
        (false, false) => Verdict::Incomplete,
    };

    let majority_needed = limits.majority_fraction * energies.len() as f64;
    let majority = verdict(above(limits.majority_mm) as f64 >= majority_needed);
    let count = verdict(above(limits.count_mm) >= limits.count_min);
    let any = verdict(above(limits.any_mm) > 0);

    let suspended: Vec<BeamKey> = measured
        .iter()
        .filter(|(_, d)| *d > limits.suspension_mm)
        .map(|(k, _)| *k)
        .collect();
    if !suspended.is_empty() {
        tracing::warn!(
            "suspension limit {} mm exceeded at GA {} by {} beam(s)",
            limits.suspension_mm,
            gantry_angle,
            suspended.len()
        );
    }

    GantryRow {
        gantry_angle,
        majority,
        count,
        any,
        suspended,
        missing,
        max_displacement_mm: measured.iter().map(|(_, d)| *d).reduce(f64::max),
    }
}
