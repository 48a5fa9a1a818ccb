//! Beam position relative to the reference-marker shadow.
//!
//! The ball bearing stays fixed between the entry and exit exposures, so the
//! difference `entry - exit` isolates its shadow. The reported shift is the
//! image center minus the shadow centroid, scaled by the pixel pitch.
//!
//! Shifts returned here are in image coordinates (y grows downward). The
//! beam's-eye-view flip is applied by the caller via [`image_to_bev`], once.

use std::path::Path;

use crate::error::AnalysisError;
use crate::region::{detect_dominant_region, RegionDetection};
use crate::spot_file::{load_spot_image, SpotImage};

/// Shift of one beam, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftMeasurement {
    /// `(dx, dy)` in mm, image coordinates.
    pub shift_mm: [f64; 2],
    /// `(dx, dy)` in whole pixels.
    pub shift_px: [i64; 2],
    /// Image center `(ncols / 2, nrows / 2)`.
    pub image_center_px: [i64; 2],
    /// Detected shadow region.
    pub shadow: RegionDetection,
    /// Pitch used for the mm conversion (entry image pitch).
    pub pitch_mm: f64,
    /// Entry and exit images reported different pitches.
    pub pitch_mismatch: bool,
}

/// Scale a pixel shift by the pitch, per axis.
pub fn pixel_shift_to_mm(shift_px: [i64; 2], pitch_mm: f64) -> [f64; 2] {
    [shift_px[0] as f64 * pitch_mm, shift_px[1] as f64 * pitch_mm]
}

/// Convert an image-coordinate shift to beam's-eye-view (negate y).
pub fn image_to_bev(shift_mm: [f64; 2]) -> [f64; 2] {
    [shift_mm[0], -shift_mm[1]]
}

/// Measure the shadow-relative shift from preloaded entry and exit images.
pub fn measure_shift(
    entry: &SpotImage,
    exit: &SpotImage,
    threshold_pct: f64,
) -> Result<ShiftMeasurement, AnalysisError> {
    let pitch_mismatch = entry.pitch_mm() != exit.pitch_mm();
    if pitch_mismatch {
        tracing::warn!(
            "entry pitch {} mm differs from exit pitch {} mm; using entry pitch",
            entry.pitch_mm(),
            exit.pitch_mm()
        );
    }
    let pitch_mm = entry.pitch_mm();

    let diff = entry.difference(exit)?;
    let shadow = detect_dominant_region(&diff, threshold_pct)?;

    let image_center_px = entry.center_px();
    let c = shadow.region.centroid;
    let shift_px = [image_center_px[0] - c[0], image_center_px[1] - c[1]];

    tracing::debug!(
        "shadow centroid {:?}, image center {:?}, shift {:?} px",
        c,
        image_center_px,
        shift_px
    );

    Ok(ShiftMeasurement {
        shift_mm: pixel_shift_to_mm(shift_px, pitch_mm),
        shift_px,
        image_center_px,
        shadow,
        pitch_mm,
        pitch_mismatch,
    })
}

/// Load entry and exit exports and measure the shift.
pub fn measure_shift_files(
    entry_path: &Path,
    exit_path: &Path,
    threshold_pct: f64,
) -> Result<ShiftMeasurement, AnalysisError> {
    let entry = load_spot_image(entry_path)?;
    let exit = load_spot_image(exit_path)?;
    measure_shift(&entry, &exit, threshold_pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::test_utils::{gaussian_spot, rect_image, write_spot_file};

    /// Entry/exit pair whose difference is a 4x4 block at `(col0, row0)`.
    fn pair_with_shadow(col0: u32, row0: u32, pitch: f64) -> (SpotImage, SpotImage) {
        let exit = gaussian_spot(100, 100, [50.0, 50.0], 15.0, 1000.0);
        let mut entry = exit.clone();
        for y in row0..row0 + 4 {
            for x in col0..col0 + 4 {
                entry.get_pixel_mut(x, y).0[0] += 400.0;
            }
        }
        (SpotImage::new(entry, pitch), SpotImage::new(exit, pitch))
    }

    #[test]
    fn centered_shadow_gives_zero_shift_for_any_pitch() {
        for pitch in [0.05, 0.1, 0.37] {
            // Rows/cols 48..=51 -> centroid 49.5 -> rounds to 50 == center.
            let (entry, exit) = pair_with_shadow(48, 48, pitch);
            let m = measure_shift(&entry, &exit, 50.0).unwrap();
            assert_eq!(m.shift_px, [0, 0]);
            assert_eq!(m.shift_mm, [0.0, 0.0]);
            assert!(!m.pitch_mismatch);
        }
    }

    #[test]
    fn offset_shadow_is_center_minus_centroid() {
        // Block cols 46..=49 (x 47.5 -> 48), rows 52..=55 (y 53.5 -> 54).
        let (entry, exit) = pair_with_shadow(46, 52, 0.1);
        let m = measure_shift(&entry, &exit, 50.0).unwrap();
        assert_eq!(m.shadow.region.centroid, [48, 54]);
        assert_eq!(m.image_center_px, [50, 50]);
        assert_eq!(m.shift_px, [2, -4]);
        assert_abs_diff_eq!(m.shift_mm[0], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(m.shift_mm[1], -0.4, epsilon = 1e-12);
    }

    #[test]
    fn pitch_scaling() {
        let mm = pixel_shift_to_mm([3, -2], 0.1);
        assert_abs_diff_eq!(mm[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(mm[1], -0.2, epsilon = 1e-12);
    }

    #[test]
    fn bev_flip_negates_y_only() {
        assert_eq!(image_to_bev([0.3, -0.2]), [0.3, 0.2]);
        assert_eq!(image_to_bev(image_to_bev([1.0, 2.0])), [1.0, 2.0]);
    }

    #[test]
    fn pitch_mismatch_uses_entry_pitch() {
        let (entry, exit) = pair_with_shadow(46, 48, 0.1);
        let exit = SpotImage::new(exit.pixels().clone(), 0.2);
        let m = measure_shift(&entry, &exit, 50.0).unwrap();
        assert!(m.pitch_mismatch);
        assert_eq!(m.pitch_mm, 0.1);
        assert_abs_diff_eq!(m.shift_mm[0], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn identical_images_are_degenerate() {
        let img = SpotImage::new(rect_image(20, 20, 1.0, &[]), 0.1);
        assert_eq!(
            measure_shift(&img, &img, 50.0).unwrap_err(),
            AnalysisError::DegenerateImage
        );
    }

    #[test]
    fn measures_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let (entry, exit) = pair_with_shadow(50, 50, 0.1);
        let e = write_spot_file(dir.path(), "001", "csv", &entry, Some(10.0), None);
        let x = write_spot_file(dir.path(), "001", "txt", &exit, None, None);
        let m = measure_shift_files(&e, &x, 50.0).unwrap();
        // Block cols/rows 50..=53 -> centroid 51.5 -> 52.
        assert_eq!(m.shift_px, [-2, -2]);
    }
}
