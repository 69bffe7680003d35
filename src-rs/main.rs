mod config;
mod coords;
mod desktop;
mod error;
mod execute;
mod geometry;
mod imaging;
mod item;
mod overlay;
mod panel;
mod plan;
mod ports;
mod price;
mod quality;
mod retry;
mod scroll;
mod segment;
mod session;
#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use config::EngineConfig;
use desktop::DesktopUi;
use ports::CancelToken;
use serde_json::{json, Value};
use session::Session;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "warehouse-liquidator",
    version,
    about = "Scan a game warehouse grid by screen automation and sell what is not worth keeping"
)]
struct Cli {
    /// Engine config JSON (falls back to $WHLQ_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Highest quality tier that may be sold
    #[arg(long, global = true)]
    quality_ceiling: Option<u8>,
    /// Market margin over the system price required to list on the market
    #[arg(long, global = true)]
    profit_threshold: Option<i64>,
    /// -v for debug logs, -vv for trace (RUST_LOG wins when set)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Locate the grid anchors and print the grid geometry
    Geometry(OverlayArgs),
    /// Measure the scrollbar scale and current scroll state
    Calibrate,
    /// Scan the warehouse and print every item found
    Scan(ScanArgs),
    /// Scan, plan and sell
    Run(RunArgs),
    /// Map a colour to its quality tier
    Classify(ClassifyArgs),
    /// Extract the number from a recognised price text
    ParsePrice(ParsePriceArgs),
}

#[derive(Args, Debug)]
struct OverlayArgs {
    /// Write the captured frame with the grid drawn over it
    #[arg(long)]
    overlay: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[arg(long)]
    overlay: Option<PathBuf>,
    /// Also write the JSON result to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Stop after planning; nothing is sold
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Colour as #rrggbb
    #[arg(long)]
    color: String,
}

#[derive(Args, Debug)]
struct ParsePriceArgs {
    text: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Geometry(args) => command_geometry(config, args),
        Commands::Calibrate => command_calibrate(config),
        Commands::Scan(args) => command_scan(config, args),
        Commands::Run(args) => command_run(config, args),
        Commands::Classify(args) => command_classify(&config, args),
        Commands::ParsePrice(args) => command_parse_price(args),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(ceiling) = cli.quality_ceiling {
        config.policy.quality_ceiling = ceiling;
    }
    if let Some(threshold) = cli.profit_threshold {
        config.policy.profit_threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

fn desktop_session(config: EngineConfig) -> Result<Session<DesktopUi>> {
    let ui = DesktopUi::new(&config).context("failed to set up desktop adapters")?;
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupted; stopping before the next screen action");
        on_interrupt.cancel();
    })
    .context("failed to install interrupt handler")?;
    Ok(Session::new(ui, config).with_cancel(cancel))
}

fn command_geometry(config: EngineConfig, args: OverlayArgs) -> Result<()> {
    let mut session = desktop_session(config)?;
    let geometry = session.detect_geometry()?;

    if let Some(path) = &args.overlay {
        let frame = session.capture()?;
        let grid = &session.config().grid;
        let image = overlay::render_overlay(&frame, &geometry, grid.columns, grid.visible_rows, 0, &[]);
        overlay::save_png(&image, path)?;
    }

    print_json(&json!({
        "geometry": geometry,
        "overlay": args.overlay.as_deref().map(abs_path),
    }))
}

fn command_calibrate(config: EngineConfig) -> Result<()> {
    let mut session = desktop_session(config)?;
    let geometry = session.detect_geometry()?;
    let calibration = session.calibrate_scroll()?;
    let state = session.read_scroll_state()?;
    print_json(&json!({
        "geometry": geometry,
        "calibration": calibration,
        "scroll": state,
    }))
}

fn command_scan(config: EngineConfig, args: ScanArgs) -> Result<()> {
    let mut session = desktop_session(config)?;
    let scan = session.scan()?;

    if let Some(path) = &args.overlay {
        let frame = session.capture()?;
        let grid = &session.config().grid;
        let image = overlay::render_overlay(
            &frame,
            &scan.geometry,
            grid.columns,
            grid.visible_rows,
            scan.scroll.top_visible_row,
            &scan.items,
        );
        overlay::save_png(&image, path)?;
    }

    let value = serde_json::to_value(&scan)?;
    if let Some(path) = &args.report {
        write_json_pretty(path, &value)?;
    }
    print_json(&value)
}

fn command_run(config: EngineConfig, args: RunArgs) -> Result<()> {
    let mut session = desktop_session(config)?;
    let report = session.run(args.dry_run)?;
    let value = serde_json::to_value(&report)?;
    if let Some(path) = &args.report {
        write_json_pretty(path, &value)?;
    }
    print_json(&value)
}

fn command_classify(config: &EngineConfig, args: ClassifyArgs) -> Result<()> {
    let Some(rgb) = quality::parse_hex_color(&args.color) else {
        bail!("colour must be #rrggbb: {}", args.color);
    };
    let classifier = quality::QualityClassifier::from_config(&config.quality);
    let lab = quality::rgb_to_lab(rgb);
    print_json(&json!({
        "color": args.color,
        "lab": lab.map(|v| round_to(v, 2)),
        "tier": classifier.classify(rgb),
    }))
}

fn command_parse_price(args: ParsePriceArgs) -> Result<()> {
    let value = price::extract_number(&args.text);
    print_json(&json!({
        "text": args.text,
        "value": value.unwrap_or(0),
        "parsed": value.is_some(),
    }))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}
