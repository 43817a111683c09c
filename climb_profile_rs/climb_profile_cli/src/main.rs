mod chart;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use climb_profile::{
    compute_profile, parse_track, BandSet, BandSpec, DistanceMode, Params, Profile,
    TrackPoint,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::chart::{auto_y_max, render_png, ChartOptions, CANVAS_SIZE};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Render a GPX elevation profile banded by average gradient"
)]
struct Cli {
    /// GPX track to render
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output PNG path
    #[arg(short, long, default_value = "points.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Points per gradient-averaging window (default: 5 per 100 track points)
    #[arg(long)]
    window: Option<usize>,

    /// JSON file with gradient thresholds and colors
    #[arg(long, value_hint = ValueHint::FilePath)]
    bands: Option<PathBuf>,

    /// Horizontal distance formula
    #[arg(long, value_enum, default_value_t = DistanceModeArg::Haversine)]
    distance_mode: DistanceModeArg,

    /// Chart title
    #[arg(long)]
    title: Option<String>,

    /// Lower elevation bound of the chart (m)
    #[arg(long, default_value_t = 0.0)]
    y_min: f64,

    /// Upper elevation bound of the chart (m); default fits the track
    #[arg(long)]
    y_max: Option<f64>,

    /// Draw axes and grid
    #[arg(long, action = ArgAction::SetTrue)]
    axes: bool,

    /// Distance tick interval with --axes (m)
    #[arg(long, default_value_t = 1000.0)]
    x_tick: f64,

    /// Elevation tick interval with --axes (m)
    #[arg(long, default_value_t = 100.0)]
    y_tick: f64,

    /// Omit the band legend
    #[arg(long, action = ArgAction::SetTrue)]
    no_legend: bool,

    /// Also write the derived per-point profile as CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Log timings for each stage
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DistanceModeArg {
    Haversine,
    Flat,
}

impl From<DistanceModeArg> for DistanceMode {
    fn from(arg: DistanceModeArg) -> Self {
        match arg {
            DistanceModeArg::Haversine => DistanceMode::Haversine,
            DistanceModeArg::Flat => DistanceMode::Flat,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    handle_render(&cli)
}

fn handle_render(cli: &Cli) -> Result<()> {
    let t_start = Instant::now();
    let band_spec = match cli.bands.as_deref() {
        Some(path) => load_band_spec(path)?,
        None => BandSpec::default(),
    };
    let bands = band_spec
        .to_band_set()
        .context("invalid gradient bands")?;

    let t_read = Instant::now();
    let track = load_track(&cli.input)?;
    info!("Loaded {} track points from {}", track.len(), cli.input.display());
    let read_elapsed = t_read.elapsed();

    let params = Params {
        window_width: cli.window,
        distance_mode: cli.distance_mode.into(),
        bands: band_spec,
    };
    let t_compute = Instant::now();
    let profile = compute_profile(&track, &params)?;
    let compute_elapsed = t_compute.elapsed();
    info!(
        "Profile: {:.0} m over {} points, {} windows of {} points",
        profile.total_distance(),
        profile.points.len(),
        profile.windows.len(),
        profile.window_width
    );

    let opts = ChartOptions {
        size: CANVAS_SIZE,
        title: cli.title.clone(),
        y_min: cli.y_min,
        y_max: cli
            .y_max
            .unwrap_or_else(|| auto_y_max(&profile, cli.y_min)),
        show_axes: cli.axes,
        x_tick_m: cli.x_tick,
        y_tick_m: cli.y_tick,
        legend: !cli.no_legend,
    };
    debug!(?opts, "chart options");

    let t_render = Instant::now();
    render_png(&profile, &bands, &cli.output, &opts)
        .with_context(|| format!("failed to render {}", cli.output.display()))?;
    let render_elapsed = t_render.elapsed();
    info!("Wrote plot: {}", cli.output.display());

    if let Some(csv_path) = cli.csv.as_deref() {
        write_profile_csv(csv_path, &profile, &bands)?;
        info!("Wrote CSV: {}", csv_path.display());
    }

    if cli.profile || cli.verbose {
        info!(
            "Timing: read {:.1} ms, compute {:.1} ms, render {:.1} ms, total {:.1} ms",
            read_elapsed.as_secs_f64() * 1000.0,
            compute_elapsed.as_secs_f64() * 1000.0,
            render_elapsed.as_secs_f64() * 1000.0,
            t_start.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

fn load_track(path: &Path) -> Result<Vec<TrackPoint>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_track(&data).with_context(|| format!("failed to load track from {}", path.display()))
}

fn load_band_spec(path: &Path) -> Result<BandSpec> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read band spec {}", path.display()))?;
    BandSpec::from_json(&text).with_context(|| format!("in {}", path.display()))
}

fn write_profile_csv(path: &Path, profile: &Profile, bands: &BandSet) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_profile_rows(&mut writer, profile, bands)?;
    writer.flush()?;
    Ok(())
}

fn write_profile_rows<W: io::Write>(
    writer: &mut csv::Writer<W>,
    profile: &Profile,
    bands: &BandSet,
) -> Result<()> {
    writer.write_record([
        "index",
        "distance_m",
        "elevation_m",
        "gradient_pct",
        "window_avg_pct",
        "band",
    ])?;
    for (idx, point) in profile.points.iter().enumerate() {
        let window = profile.window_at(idx);
        let band_label = window
            .and_then(|w| bands.get(w.band))
            .map(|b| b.label())
            .unwrap_or_default();
        writer.write_record([
            idx.to_string(),
            format!("{:.3}", point.distance),
            format_optional(point.elevation, 2),
            format_optional(point.gradient, 3),
            window.map_or_else(String::new, |w| format_optional(w.average, 3)),
            band_label,
        ])?;
    }
    Ok(())
}

fn format_optional(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{:.*}", decimals, value)
    } else {
        String::new()
    }
}
