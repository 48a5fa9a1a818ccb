//! Dominant bright region detection.
//!
//! The image is normalized by its maximum, thresholded at a percentage of that
//! maximum, and labelled with 8-connectivity. When several regions survive the
//! threshold the one with the largest equivalent diameter wins.
//!
//! All results leave this module in `(x, y) = (column, row)` pixel order; the
//! row/column to x/y swap happens only in `centroid_xy`.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::error::AnalysisError;
use crate::spot_file::{IntensityImage, SpotImage};

const MASK_ON: u8 = 255;

/// A connected bright region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Centroid `(x, y)` rounded to the nearest pixel.
    pub centroid: [i64; 2],
    /// Diameter of the disk with the same pixel area.
    pub equivalent_diameter: f64,
    /// Pixel count.
    pub area: usize,
}

/// Outcome of a dominant-region search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionDetection {
    /// Selected region.
    pub region: Region,
    /// Number of connected regions above threshold.
    pub n_regions: usize,
}

impl RegionDetection {
    /// More than one region was found and a choice had to be made.
    pub fn is_ambiguous(&self) -> bool {
        self.n_regions > 1
    }
}

/// Diameter of a disk with the given pixel area: `sqrt(4 * area / pi)`.
pub fn equivalent_diameter(area: usize) -> f64 {
    (4.0 * area as f64 / std::f64::consts::PI).sqrt()
}

/// Binary mask of pixels whose normalized intensity exceeds `threshold_pct / 100`.
pub fn threshold_mask(
    image: &IntensityImage,
    threshold_pct: f64,
) -> Result<GrayImage, AnalysisError> {
    let max = image.pixels().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max);
    if max <= 0.0 {
        return Err(AnalysisError::DegenerateImage);
    }
    let cut = threshold_pct / 100.0;
    Ok(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0] as f64 / max as f64;
        Luma([if v > cut { MASK_ON } else { 0 }])
    }))
}

/// All 8-connected regions of a binary mask, in label order.
pub fn regions_from_mask(mask: &GrayImage) -> Vec<Region> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let n_labels = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if n_labels == 0 {
        return Vec::new();
    }

    // Per label: [area, sum_row, sum_col]
    let mut acc = vec![[0.0f64; 3]; n_labels];
    for (x, y, p) in labels.enumerate_pixels() {
        let l = p[0] as usize;
        if l == 0 {
            continue;
        }
        let a = &mut acc[l - 1];
        a[0] += 1.0;
        a[1] += y as f64;
        a[2] += x as f64;
    }

    acc.iter()
        .filter(|a| a[0] > 0.0)
        .map(|a| {
            let area = a[0] as usize;
            Region {
                centroid: centroid_xy(a[1] / a[0], a[2] / a[0]),
                equivalent_diameter: equivalent_diameter(area),
                area,
            }
        })
        .collect()
}

/// Find the dominant bright region of `image` at `threshold_pct`.
///
/// Zero regions is an error; several regions are resolved by the largest
/// equivalent diameter (first label wins ties) and logged as a warning.
pub fn detect_dominant_region(
    image: &IntensityImage,
    threshold_pct: f64,
) -> Result<RegionDetection, AnalysisError> {
    let mask = threshold_mask(image, threshold_pct)?;
    let regions = regions_from_mask(&mask);

    let mut best: Option<Region> = None;
    for r in &regions {
        if best.map_or(true, |b| r.equivalent_diameter > b.equivalent_diameter) {
            best = Some(*r);
        }
    }
    let region = best.ok_or(AnalysisError::NoRegionFound { threshold_pct })?;

    if regions.len() > 1 {
        tracing::warn!(
            "{} regions found at {}% threshold; using largest (equivalent diameter {:.2} px at {:?})",
            regions.len(),
            threshold_pct,
            region.equivalent_diameter,
            region.centroid,
        );
    }

    Ok(RegionDetection {
        region,
        n_regions: regions.len(),
    })
}

/// Equivalent diameter (mm) of the dominant region of a spot image.
pub fn spot_equivalent_diameter_mm(
    spot: &SpotImage,
    threshold_pct: f64,
) -> Result<f64, AnalysisError> {
    let det = detect_dominant_region(spot.pixels(), threshold_pct)?;
    Ok(det.region.equivalent_diameter * spot.pitch_mm())
}

/// Convert a `(row, col)` centroid to rounded `(x, y)` pixel coordinates.
///
/// Halves round to even.
fn centroid_xy(row: f64, col: f64) -> [i64; 2] {
    [col.round_ties_even() as i64, row.round_ties_even() as i64]
}
