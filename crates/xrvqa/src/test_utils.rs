//! Synthetic spot images and export files for unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::Luma;

use crate::spot_file::{IntensityImage, SpotImage};

/// Isotropic Gaussian spot `amplitude * exp(-r² / 2σ²)` on a zero background.
pub(crate) fn gaussian_spot(
    ncols: u32,
    nrows: u32,
    center_xy: [f64; 2],
    sigma_px: f64,
    amplitude: f64,
) -> IntensityImage {
    IntensityImage::from_fn(ncols, nrows, |x, y| {
        let dx = x as f64 - center_xy[0];
        let dy = y as f64 - center_xy[1];
        let v = amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma_px * sigma_px)).exp();
        Luma([v as f32])
    })
}

/// Constant background with axis-aligned rectangles set to `value`.
///
/// Each rectangle is `[col0, row0, width, height]`.
pub(crate) fn rect_image(
    ncols: u32,
    nrows: u32,
    background: f32,
    rects: &[([u32; 4], f32)],
) -> IntensityImage {
    let mut img = IntensityImage::from_pixel(ncols, nrows, Luma([background]));
    for &([c0, r0, w, h], value) in rects {
        for y in r0..r0 + h {
            for x in c0..c0 + w {
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }
    img
}

/// Render a spot image in the device export layout.
pub(crate) fn spot_file_text(
    image: &SpotImage,
    diameter_mm: Option<f64>,
    arc_radial_mm: Option<(f64, f64)>,
) -> String {
    let mut out = format!("Spot image,Pitch:,{},", image.pitch_mm());
    if let Some(d) = diameter_mm {
        out.push_str(&format!("Diameter:,{},", d));
    }
    out.push('\n');
    out.push_str("Logos XRV-124 export\n");
    out.push_str(&format!("Size,{},{},\n", image.nrows(), image.ncols()));
    for row in image.pixels().rows() {
        let vals: Vec<String> = row.map(|p| p[0].to_string()).collect();
        out.push_str(&vals.join(","));
        out.push('\n');
    }
    if let Some((arc, radial)) = arc_radial_mm {
        out.push_str(&format!("Arc Style,Entry (mm):,{},Exit (mm):,{},\n", arc, arc));
        out.push_str(&format!(
            "Radial Style,Entry (mm):,{},Exit (mm):,{},\n",
            radial, radial
        ));
    }
    out
}

/// Write `<dir>/<stem>.<ext>` in the export layout and return its path.
pub(crate) fn write_spot_file(
    dir: &Path,
    stem: &str,
    ext: &str,
    image: &SpotImage,
    diameter_mm: Option<f64>,
    arc_radial_mm: Option<(f64, f64)>,
) -> PathBuf {
    let path = dir.join(format!("{}.{}", stem, ext));
    std::fs::write(&path, spot_file_text(image, diameter_mm, arc_radial_mm))
        .expect("write synthetic spot file");
    path
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` under a subscriber that records every event; returns the output too.
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buf.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}
