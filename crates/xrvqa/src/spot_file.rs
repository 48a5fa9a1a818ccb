//! Spot image export reader.
//!
//! The imaging device exports each spot as a comma-delimited text file:
//!
//! - line 0 carries the pixel pitch after a `Pitch:,` marker (and, for entry
//!   spots, the vendor diameter after `Diameter:,`),
//! - line 2 carries `<label>,<nrows>,<ncols>,...`,
//! - lines `3..3 + nrows` hold `ncols` comma-separated intensities each,
//! - further labelled lines (arc/radial widths) may follow the pixel block.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};

use crate::error::AnalysisError;

/// Single-channel floating point intensity grid (`width = ncols`, `height = nrows`).
pub type IntensityImage = ImageBuffer<Luma<f32>, Vec<f32>>;

const PITCH_LABEL: &str = "Pitch:,";
const DIAMETER_LABEL: &str = "Diameter:,";
const WIDTH_LABEL: &str = "Entry (mm):,";
const ARC_TAG: &str = "Arc Style";
const RADIAL_TAG: &str = "Radial Style";
const DIMS_LINE: usize = 2;
const FIRST_DATA_LINE: usize = 3;

/// Spot intensity image plus its physical pixel pitch.
#[derive(Debug, Clone)]
pub struct SpotImage {
    pixels: IntensityImage,
    pitch_mm: f64,
}

impl SpotImage {
    pub fn new(pixels: IntensityImage, pitch_mm: f64) -> Self {
        Self { pixels, pitch_mm }
    }

    /// Number of image rows.
    pub fn nrows(&self) -> usize {
        self.pixels.height() as usize
    }

    /// Number of image columns.
    pub fn ncols(&self) -> usize {
        self.pixels.width() as usize
    }

    /// Physical size of one pixel (mm).
    pub fn pitch_mm(&self) -> f64 {
        self.pitch_mm
    }

    pub fn pixels(&self) -> &IntensityImage {
        &self.pixels
    }

    /// Geometric image center `(ncols / 2, nrows / 2)` in integer pixel coordinates.
    pub fn center_px(&self) -> [i64; 2] {
        [(self.ncols() / 2) as i64, (self.nrows() / 2) as i64]
    }

    /// Pixel-wise `self - other`.
    pub fn difference(&self, other: &SpotImage) -> Result<IntensityImage, AnalysisError> {
        if self.pixels.dimensions() != other.pixels.dimensions() {
            return Err(AnalysisError::ShapeMismatch {
                entry: [self.nrows(), self.ncols()],
                exit: [other.nrows(), other.ncols()],
            });
        }
        let (w, h) = self.pixels.dimensions();
        Ok(IntensityImage::from_fn(w, h, |x, y| {
            Luma([self.pixels.get_pixel(x, y)[0] - other.pixels.get_pixel(x, y)[0]])
        }))
    }
}

/// One spot export held in memory, so image and metadata are parsed from a
/// single read.
#[derive(Debug, Clone)]
pub struct SpotFile {
    path: PathBuf,
    contents: String,
}

impl SpotFile {
    /// Read a spot export from disk.
    pub fn read(path: &Path) -> Result<Self, AnalysisError> {
        let contents = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, &e))?;
        Ok(Self::from_contents(path, contents))
    }

    /// Wrap already-loaded file contents; `path` is used only in error messages.
    pub fn from_contents(path: impl Into<PathBuf>, contents: String) -> Self {
        Self {
            path: path.into(),
            contents,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the pixel block and pitch.
    pub fn image(&self) -> Result<SpotImage, AnalysisError> {
        let path = self.path.as_path();
        let lines: Vec<&str> = self.contents.lines().collect();

        let first = lines
            .first()
            .ok_or_else(|| AnalysisError::malformed(path, "file is empty"))?;
        let pitch_mm = value_after(first, PITCH_LABEL)
            .ok_or_else(|| AnalysisError::malformed(path, "no finite pitch on line 0"))?;
        if pitch_mm <= 0.0 {
            return Err(AnalysisError::malformed(
                path,
                format!("pitch must be > 0, got {}", pitch_mm),
            ));
        }

        let dims_line = lines
            .get(DIMS_LINE)
            .ok_or_else(|| AnalysisError::malformed(path, "dimension line missing"))?;
        let (nrows, ncols) = parse_dims(dims_line)
            .ok_or_else(|| AnalysisError::malformed(path, "row/column counts missing on line 2"))?;

        let available = lines.len().saturating_sub(FIRST_DATA_LINE);
        if available < nrows {
            return Err(AnalysisError::malformed(
                path,
                format!("expected {} data rows, found {}", nrows, available),
            ));
        }

        let (width, height) = match (u32::try_from(ncols), u32::try_from(nrows)) {
            (Ok(w), Ok(h)) if nrows.checked_mul(ncols).is_some() => (w, h),
            _ => {
                return Err(AnalysisError::malformed(
                    path,
                    format!("image size {}x{} is out of range", nrows, ncols),
                ))
            }
        };

        // Grown row by row: the header sizes are checked against real rows only.
        let mut data = Vec::new();
        for (r, line) in lines[FIRST_DATA_LINE..FIRST_DATA_LINE + nrows].iter().enumerate() {
            let row = parse_row(line).ok_or_else(|| {
                AnalysisError::malformed(path, format!("data row {} is not finite numeric", r))
            })?;
            if row.len() != ncols {
                return Err(AnalysisError::malformed(
                    path,
                    format!("data row {} has {} values, expected {}", r, row.len(), ncols),
                ));
            }
            data.extend(row);
        }

        let pixels = IntensityImage::from_raw(width, height, data)
            .ok_or_else(|| AnalysisError::malformed(path, "pixel buffer size mismatch"))?;
        Ok(SpotImage::new(pixels, pitch_mm))
    }

    /// Vendor-reported spot diameter (mm).
    pub fn diameter(&self) -> Result<f64, AnalysisError> {
        self.contents
            .lines()
            .find_map(|line| value_after(line, DIAMETER_LABEL))
            .ok_or_else(|| self.missing(DIAMETER_LABEL))
    }

    /// Vendor-reported entry spot `(arc, radial)` widths (mm).
    pub fn arc_radial_widths(&self) -> Result<(f64, f64), AnalysisError> {
        let arc = self
            .tagged_value(ARC_TAG)
            .ok_or_else(|| self.missing(ARC_TAG))?;
        let radial = self
            .tagged_value(RADIAL_TAG)
            .ok_or_else(|| self.missing(RADIAL_TAG))?;
        Ok((arc, radial))
    }

    fn tagged_value(&self, tag: &str) -> Option<f64> {
        self.contents
            .lines()
            .filter(|line| line.contains(tag))
            .find_map(|line| value_after(line, WIDTH_LABEL))
    }

    fn missing(&self, label: &str) -> AnalysisError {
        AnalysisError::MissingMetadata {
            path: self.path.clone(),
            label: label.trim_end_matches(",").trim_end_matches(':').to_string(),
        }
    }
}

/// Load a spot image (pixels + pitch) from an export file.
pub fn load_spot_image(path: &Path) -> Result<SpotImage, AnalysisError> {
    SpotFile::read(path)?.image()
}

/// First comma-delimited field following `label` on `line`, if finite.
fn value_after(line: &str, label: &str) -> Option<f64> {
    let (_, rest) = line.split_once(label)?;
    let v: f64 = rest.split(',').next()?.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

fn parse_dims(line: &str) -> Option<(usize, usize)> {
    let mut fields = line.split(',').skip(1);
    let nrows: usize = fields.next()?.trim().parse().ok()?;
    let ncols: usize = fields.next()?.trim().parse().ok()?;
    (nrows > 0 && ncols > 0).then_some((nrows, ncols))
}

/// Parse one data row; a single trailing empty field (trailing comma) is ignored.
/// `NaN` and infinities are rejected.
fn parse_row(line: &str) -> Option<Vec<f32>> {
    let line = line.trim_end();
    let line = line.strip_suffix(',').unwrap_or(line);
    line.split(',')
        .map(|v| v.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect()
}
