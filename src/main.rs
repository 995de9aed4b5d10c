use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rasterkit::settings::SettingsPersistence;
use rasterkit::{format_minutes, EngravingConfig, RasterMode};

/// Raster image to laser G-code converter.
#[derive(Parser)]
#[command(name = "rasterkit", version, about)]
struct Cli {
    /// Engraving configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Common configuration overrides, applied on top of the config file.
#[derive(clap::Args)]
struct Overrides {
    /// Scan-axis resolution in dots per inch.
    #[arg(long, global = true)]
    dpi: Option<u32>,
    /// Target scan-axis length, mm.
    #[arg(long, global = true)]
    dimension: Option<f64>,
    /// Row pitch, mm.
    #[arg(long, global = true)]
    line_step: Option<f64>,
    /// Engraving feed, units/min.
    #[arg(long, global = true)]
    feedrate: Option<f64>,
    /// Overscan distance, mm.
    #[arg(long, global = true)]
    premove: Option<f64>,
    /// Quantization levels.
    #[arg(long, global = true)]
    gray_steps: Option<u32>,
    /// Scan along Y instead of X.
    #[arg(long, global = true)]
    vertical: bool,
    /// Invert brightness semantics.
    #[arg(long, global = true)]
    invert: bool,
    /// Stretch the scan pitch so the target length is met exactly.
    #[arg(long, global = true)]
    force_dim: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a G-code program from an image.
    Generate {
        image: PathBuf,
        /// Output path; defaults to the image name with the configured
        /// extension.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Resolve geometry and predict size/time without emitting.
    Estimate { image: PathBuf },
    /// Parse a program back into a trajectory and summarize it.
    Simulate {
        program: PathBuf,
        /// The source image the program was generated from.
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    rasterkit::init_logging()?;
    let cli = Cli::parse();

    let settings = SettingsPersistence::load_or_default(&SettingsPersistence::default_path()?)
        .context("loading settings")?;
    let config = build_config(&cli, settings.document())?;

    match &cli.command {
        Command::Generate { image, out } => generate(&config, image, out.as_deref(), settings),
        Command::Estimate { image } => estimate(&config, image),
        Command::Simulate { program, image } => simulate(&config, program, image),
    }
}

/// Assemble the job configuration: machine settings, then the config file,
/// then command-line overrides.
fn build_config(
    cli: &Cli,
    document: &rasterkit::settings::SettingsDocument,
) -> Result<EngravingConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => {
            let machine = &document.machine_settings;
            EngravingConfig {
                power_mode: machine.power_mode,
                firing_mode: machine.firing_mode,
                e_num: machine.e_num,
                ctrl_max: machine.ctrl_max,
                m67_delay: machine.m67_delay,
                premove: machine.premove,
                custom_header: machine.custom_header.clone(),
                custom_footer: machine.custom_footer.clone(),
                ..Default::default()
            }
        }
    };

    let o = &cli.overrides;
    if let Some(dpi) = o.dpi {
        config.dpi = dpi;
    }
    if let Some(dimension) = o.dimension {
        config.ui_dimension = dimension;
    }
    if let Some(line_step) = o.line_step {
        config.line_step = line_step;
    }
    if let Some(feedrate) = o.feedrate {
        config.feedrate = feedrate;
    }
    if let Some(premove) = o.premove {
        config.premove = premove;
    }
    if let Some(gray_steps) = o.gray_steps {
        config.gray_steps = gray_steps;
    }
    if o.vertical {
        config.raster_mode = RasterMode::Vertical;
    }
    if o.invert {
        config.invert = true;
    }
    if o.force_dim {
        config.force_dim = true;
    }
    Ok(config)
}

fn generate(
    config: &EngravingConfig,
    image: &Path,
    out: Option<&Path>,
    mut settings: SettingsPersistence,
) -> Result<()> {
    let program = rasterkit::generate(config, image)?;

    let out_path = match out {
        Some(path) => path.to_path_buf(),
        None => image.with_extension(&settings.document().machine_settings.extension),
    };
    std::fs::write(&out_path, &program.text)
        .with_context(|| format!("writing program to {}", out_path.display()))?;

    let geometry = &program.geometry;
    println!("wrote {}", out_path.display());
    println!(
        "  raster:    {} x {} px ({:.2} x {:.2} mm)",
        geometry.w_px, geometry.h_px, geometry.real_w, geometry.real_h
    );
    println!("  size:      {}", program.size.rendered);
    println!("  est. time: {}", format_minutes(geometry.est_min));
    if geometry.memory_warning {
        println!("  warning:   large raster; consider lowering dpi or dimensions");
    }

    let lines = program.text.lines().count() as u64;
    settings
        .document_mut()
        .stats
        .record_program(lines, geometry.est_min);
    let path = SettingsPersistence::default_path()?;
    if let Err(e) = settings.save_to_file(&path) {
        tracing::warn!("could not update stats: {e}");
    }
    Ok(())
}

fn estimate(config: &EngravingConfig, image: &Path) -> Result<()> {
    let geometry = rasterkit::estimate(config, image)?;
    println!(
        "raster:    {} x {} px ({:.2} x {:.2} mm)",
        geometry.w_px, geometry.h_px, geometry.real_w, geometry.real_h
    );
    println!(
        "pitch:     scan {:.4} mm, line {:.4} mm",
        geometry.scan_step, geometry.line_step
    );
    if let Some(hint) = &geometry.size_hint {
        println!("size:      {}", hint);
    }
    println!("est. time: {}", format_minutes(geometry.est_min));
    if let Some(capped) = geometry.capped {
        println!(
            "capped:    {} -> {} px to fit the memory budget",
            capped.original, capped.reduced
        );
    }
    Ok(())
}

fn simulate(config: &EngravingConfig, program: &Path, image: &Path) -> Result<()> {
    let geometry = rasterkit::estimate(config, image)?;
    let text = std::fs::read_to_string(program)
        .with_context(|| format!("reading program {}", program.display()))?;

    let trajectory = rasterkit::parse(&text, &geometry);
    println!("points:   {}", trajectory.points.len());
    println!(
        "duration: {} (predicted {})",
        format_minutes(trajectory.final_time() / 60.0),
        format_minutes(geometry.est_min)
    );
    if let Some(bounds) = trajectory.bounds() {
        println!(
            "bounds:   X {:.3}..{:.3}  Y {:.3}..{:.3}",
            bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
        );
    }
    for warning in &trajectory.warnings {
        eprintln!("warning: {warning}");
    }
    if !trajectory.agrees_with(&geometry) {
        eprintln!("warning: trajectory duration disagrees with the prediction");
    }
    Ok(())
}
