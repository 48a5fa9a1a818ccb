//! xrvqa CLI: beam-spot QA analysis of XRV-124 acquisitions.

use clap::{Args, Parser, Subcommand};
use image::{GrayImage, Luma};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use xrvqa::{
    create_results_dir, flagged, image_to_bev, load_shift_runs, load_spot_image, measure_shift,
    read_beam_map, run_full_sweep, shift_spreads, spot_equivalent_diameter_mm, successes,
    write_sweep_results, BeamKey, CancelToken, IntensityImage, ShiftMeasurement, SweepConfig,
    ToleranceTable, DEFAULT_TOLERANCE_MM, RESULTS_DIR,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "xrvqa")]
#[command(about = "Proton beam spot position and size QA from XRV-124 exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a full acquisition directory.
    Sweep(CliSweepArgs),

    /// Measure the shift of a single entry/exit pair.
    Spot(CliSpotArgs),

    /// Evaluate a shifts result file against the displacement limits.
    Tolerance {
        /// Shifts result file (JSON, BEV mm).
        #[arg(long)]
        shifts: PathBuf,

        /// Sweep config providing angles, energies and limits.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare shift result files from repeated irradiations.
    Repeatability {
        /// Directory holding one shifts file per run.
        #[arg(long)]
        dir: PathBuf,

        /// Flag beams whose x or y spread reaches this value (mm).
        #[arg(long, default_value_t = DEFAULT_TOLERANCE_MM)]
        tol: f64,
    },

    /// Print the default sweep configuration (JSON).
    ConfigInfo,
}

#[derive(Debug, Clone, Args)]
struct CliSweepArgs {
    /// Acquisition directory with numbered entry/exit exports.
    #[arg(long)]
    data: PathBuf,

    /// Sweep config (JSON); defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parent directory for the numbered results directory.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Override the shadow threshold (% of max).
    #[arg(long)]
    shadow_threshold: Option<f64>,

    /// Override the entry spot threshold (% of max).
    #[arg(long)]
    centroid_threshold: Option<f64>,
}

#[derive(Debug, Clone, Args)]
struct CliSpotArgs {
    /// Entry spot export.
    #[arg(long)]
    entry: PathBuf,

    /// Exit spot export.
    #[arg(long)]
    exit: PathBuf,

    /// Shadow threshold (% of max).
    #[arg(long, default_value = "50.0")]
    threshold: f64,

    /// Entry spot threshold (% of max); the sweep default when omitted.
    #[arg(long)]
    centroid_threshold: Option<f64>,

    /// Write the difference image with center and shadow marks (PNG).
    #[arg(long)]
    overlay: Option<PathBuf>,
}

impl CliSpotArgs {
    fn centroid_threshold_pct(&self) -> f64 {
        self.centroid_threshold
            .unwrap_or_else(|| SweepConfig::default().centroid_threshold_pct)
    }
}

fn load_config(path: Option<&Path>) -> CliResult<SweepConfig> {
    match path {
        Some(p) => {
            tracing::info!("Loading config: {}", p.display());
            Ok(SweepConfig::from_json_file(p)?)
        }
        None => Ok(SweepConfig::default()),
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep(args) => run_sweep(&args),
        Commands::Spot(args) => run_spot(&args),
        Commands::Tolerance { shifts, config } => run_tolerance(&shifts, config.as_deref()),
        Commands::Repeatability { dir, tol } => run_repeatability(&dir, tol),
        Commands::ConfigInfo => run_config_info(),
    }
}

// ── config-info ───────────────────────────────────────────────────────

fn run_config_info() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&SweepConfig::default())?);
    Ok(())
}

// ── sweep ─────────────────────────────────────────────────────────────

fn run_sweep(args: &CliSweepArgs) -> CliResult<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(t) = args.shadow_threshold {
        cfg.shadow_threshold_pct = t;
    }
    if let Some(t) = args.centroid_threshold {
        cfg.centroid_threshold_pct = t;
    }
    cfg.validate()?;

    tracing::info!(
        "{} gantry angles x {} energies = {} beams",
        cfg.gantry_angles.len(),
        cfg.energies.len(),
        cfg.n_beams()
    );

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; stopping after the current beam");
        on_interrupt.cancel();
    })?;

    let results = run_full_sweep(&args.data, &cfg, &cancel)?;

    let out_dir = create_results_dir(&args.out, RESULTS_DIR)?;
    write_sweep_results(&out_dir, &results)?;

    let shifts = successes(&results.shifts_bev);
    let table = ToleranceTable::evaluate(&shifts, &cfg.gantry_angles, &cfg.energies, &cfg.tolerance);
    println!("{}", table.render_text());

    let failures = results.failures();
    if !failures.is_empty() {
        println!("\n{} beam(s) with failed analyses:", failures.len());
        for (key, kinds) in &failures {
            for (kind, msg) in kinds {
                println!("  {} {}: {}", key, kind, msg);
            }
        }
    }
    if results.cancelled {
        println!(
            "\nSweep cancelled: {}/{} beams analysed",
            results.n_completed(),
            results.n_planned
        );
    }
    println!("\nResults written to {}", out_dir.display());

    Ok(())
}

// ── spot ──────────────────────────────────────────────────────────────

fn run_spot(args: &CliSpotArgs) -> CliResult<()> {
    tracing::info!("Loading entry: {}", args.entry.display());
    let entry = load_spot_image(&args.entry)?;
    tracing::info!("Loading exit: {}", args.exit.display());
    let exit = load_spot_image(&args.exit)?;
    tracing::info!(
        "Image size: {}x{}, pitch {} mm",
        entry.ncols(),
        entry.nrows(),
        entry.pitch_mm()
    );

    let m = measure_shift(&entry, &exit, args.threshold)?;
    let bev = image_to_bev(m.shift_mm);

    println!("Shadow centroid (px):  ({}, {})", m.shadow.region.centroid[0], m.shadow.region.centroid[1]);
    println!("Image center (px):     ({}, {})", m.image_center_px[0], m.image_center_px[1]);
    println!("Regions found:         {}", m.shadow.n_regions);
    println!("Shift BEV (mm):        x = {:.2}, y = {:.2}", bev[0], bev[1]);
    match spot_equivalent_diameter_mm(&entry, args.centroid_threshold_pct()) {
        Ok(d) => println!("Entry spot diameter:   {:.2} mm (equivalent)", d),
        Err(e) => tracing::warn!("entry spot diameter unavailable: {}", e),
    }

    if let Some(path) = &args.overlay {
        let diff = entry.difference(&exit)?;
        let overlay = render_overlay(&diff, &m);
        overlay.save(path)?;
        tracing::info!("Overlay written to {}", path.display());
    }

    Ok(())
}

/// Difference image scaled to 8 bits; image center marked black, shadow
/// centroid marked white.
fn render_overlay(diff: &IntensityImage, m: &ShiftMeasurement) -> GrayImage {
    let (lo, hi) = diff
        .pixels()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[0]), hi.max(p[0]))
        });
    let span = (hi - lo).max(f32::EPSILON);
    let mut out = GrayImage::from_fn(diff.width(), diff.height(), |x, y| {
        let v = (diff.get_pixel(x, y)[0] - lo) / span;
        Luma([(v * 255.0).round() as u8])
    });
    draw_cross(&mut out, m.image_center_px, Luma([0]));
    draw_cross(&mut out, m.shadow.region.centroid, Luma([255]));
    out
}

fn draw_cross(img: &mut GrayImage, center: [i64; 2], color: Luma<u8>) {
    const ARM: i64 = 4;
    let (w, h) = (img.width() as i64, img.height() as i64);
    for d in -ARM..=ARM {
        for (x, y) in [(center[0] + d, center[1]), (center[0], center[1] + d)] {
            if (0..w).contains(&x) && (0..h).contains(&y) {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

// ── tolerance ─────────────────────────────────────────────────────────

fn run_tolerance(shifts_path: &Path, config: Option<&Path>) -> CliResult<()> {
    let cfg = load_config(config)?;
    let shifts: BTreeMap<BeamKey, [f64; 2]> = read_beam_map(shifts_path)?;
    tracing::info!("{} beams read from {}", shifts.len(), shifts_path.display());

    let table = ToleranceTable::evaluate(&shifts, &cfg.gantry_angles, &cfg.energies, &cfg.tolerance);
    println!("{}", table.render_text());
    println!(
        "\nOverall: {}",
        if table.passed() { "PASS" } else { "FAIL" }
    );
    Ok(())
}

// ── repeatability ─────────────────────────────────────────────────────

fn run_repeatability(dir: &Path, tol: f64) -> CliResult<()> {
    let runs = load_shift_runs(dir)?;
    for (path, map) in &runs {
        tracing::info!("{}: {} beams", path.display(), map.len());
    }
    let maps: Vec<_> = runs.into_iter().map(|(_, m)| m).collect();
    let spreads = shift_spreads(&maps);

    let max = |i: usize| spreads.values().map(|s| s.spread_mm[i]).fold(0.0f64, f64::max);
    println!("{} runs, {} beams measured more than once", maps.len(), spreads.len());
    println!("Max spread: x = {:.2} mm, y = {:.2} mm", max(0), max(1));

    let bad = flagged(&spreads, tol);
    if bad.is_empty() {
        println!("All beams within {} mm", tol);
    } else {
        println!("{} beam(s) with spread >= {} mm:", bad.len(), tol);
        for key in bad {
            let s = spreads[&key].spread_mm;
            println!("  {}: x {:.2} mm, y {:.2} mm", key, s[0], s[1]);
        }
    }
    Ok(())
}
