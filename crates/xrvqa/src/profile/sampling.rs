//! Line profiles through a spot image.

use crate::error::AnalysisError;
use crate::spot_file::IntensityImage;

/// Straight chord between two sub-pixel points, `(x, y)` image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chord {
    pub start: [f64; 2],
    pub end: [f64; 2],
}

impl Chord {
    pub fn length(&self) -> f64 {
        (self.end[0] - self.start[0]).hypot(self.end[1] - self.start[1])
    }

    /// Number of samples taken along the chord: one per pixel of length,
    /// endpoints included.
    pub fn n_samples(&self) -> usize {
        (self.length() + 1.0).ceil() as usize
    }
}

/// Chord through the image center at `angle_deg`, counter-clockwise from the
/// +x axis as seen on screen (y grows downward, so positive angles move the
/// start point up).
///
/// The half-length is `min(nrows, ncols) / 2 - margin_px`.
pub fn chord_through_center(
    ncols: usize,
    nrows: usize,
    angle_deg: f64,
    margin_px: usize,
) -> Result<Chord, AnalysisError> {
    let half = nrows.min(ncols) / 2;
    if half <= margin_px {
        return Err(AnalysisError::ImageTooSmall {
            nrows,
            ncols,
            margin_px,
        });
    }
    let r = (half - margin_px) as f64;
    let cx = (ncols / 2) as f64;
    let cy = (nrows / 2) as f64;
    let (s, c) = angle_deg.to_radians().sin_cos();
    Ok(Chord {
        start: [cx + r * c, cy - r * s],
        end: [cx - r * c, cy + r * s],
    })
}

/// Bilinear interpolation at `(x, y)`; coordinates outside the grid are
/// clamped to the nearest edge pixel.
#[inline]
pub fn bilinear_sample(img: &IntensityImage, x: f64, y: f64) -> f64 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let p00 = img.get_pixel(x0, y0)[0] as f64;
    let p10 = img.get_pixel(x1, y0)[0] as f64;
    let p01 = img.get_pixel(x0, y1)[0] as f64;
    let p11 = img.get_pixel(x1, y1)[0] as f64;
    (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
}

/// Evenly spaced bilinear samples from `chord.start` to `chord.end`, inclusive.
pub fn sample_chord(img: &IntensityImage, chord: &Chord) -> Vec<f64> {
    let n = chord.n_samples();
    if n < 2 {
        return vec![bilinear_sample(img, chord.start[0], chord.start[1])];
    }
    let step = 1.0 / (n - 1) as f64;
    (0..n)
        .map(|i| {
            let t = i as f64 * step;
            let x = chord.start[0] + t * (chord.end[0] - chord.start[0]);
            let y = chord.start[1] + t * (chord.end[1] - chord.start[1]);
            bilinear_sample(img, x, y)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Luma;

    #[test]
    fn horizontal_chord_runs_right_to_left() {
        let c = chord_through_center(200, 120, 0.0, 20).unwrap();
        assert_eq!(c.start, [140.0, 60.0]);
        assert_eq!(c.end, [60.0, 60.0]);
        assert_eq!(c.n_samples(), 81);
    }

    #[test]
    fn ninety_degrees_is_vertical_with_start_above_center() {
        let c = chord_through_center(100, 100, 90.0, 20).unwrap();
        assert_abs_diff_eq!(c.start[0], 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.start[1], 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.end[1], 80.0, epsilon = 1e-9);
    }

    #[test]
    fn margin_consuming_the_image_is_rejected() {
        let err = chord_through_center(40, 60, 0.0, 20).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::ImageTooSmall {
                nrows: 60,
                ncols: 40,
                margin_px: 20
            }
        );
    }

    #[test]
    fn bilinear_midpoint_and_clamping() {
        let mut img = IntensityImage::new(4, 4);
        img.put_pixel(1, 1, Luma([100.0]));
        img.put_pixel(2, 1, Luma([200.0]));
        img.put_pixel(1, 2, Luma([100.0]));
        img.put_pixel(2, 2, Luma([200.0]));
        assert_abs_diff_eq!(bilinear_sample(&img, 1.5, 1.5), 150.0, epsilon = 1e-9);
        assert_eq!(bilinear_sample(&img, 2.0, 1.0), 200.0);
        img.put_pixel(3, 3, Luma([7.0]));
        assert_eq!(bilinear_sample(&img, 10.0, 10.0), 7.0);
    }

    #[test]
    fn diagonal_chord_samples_a_ramp_linearly() {
        let img = IntensityImage::from_fn(101, 101, |x, _| Luma([x as f32]));
        let c = chord_through_center(101, 101, 45.0, 20).unwrap();
        let profile = sample_chord(&img, &c);
        assert_eq!(profile.len(), c.n_samples());
        assert!((profile[0] - c.start[0]).abs() < 1e-4);
        assert!((profile[profile.len() - 1] - c.end[0]).abs() < 1e-4);
        assert!(profile.windows(2).all(|w| w[1] < w[0]));
    }
}
