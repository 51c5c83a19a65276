//! CLI binary for las2geo.
//!
//! A thin shim over the library crate that maps CLI flags to `RawOptions`
//! and prints the outcome.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use las2geo::{
    epsg_search_url, lookup_epsg, ActionLogger, ConversionObserver, ConvertRequest, Converter,
    ObserverSet, Outcome, RasterError, RasterResult, RawOptions, VectorExportJob,
};
use once_cell::sync::Lazy;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Terminal styling ─────────────────────────────────────────────────────────

/// SGR codes used on stderr.
#[derive(Clone, Copy)]
enum Style {
    Bold = 1,
    Dim = 2,
    Red = 31,
    Green = 32,
    Cyan = 36,
}

/// Plain text when stderr is not a terminal or `NO_COLOR` is set.
fn styled(style: Style, s: &str) -> String {
    static ENABLED: Lazy<bool> =
        Lazy::new(|| std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal());
    paint(style, s, *ENABLED)
}

fn paint(style: Style, s: &str, enabled: bool) -> String {
    if enabled {
        format!("\x1b[{}m{s}\x1b[0m", style as u8)
    } else {
        s.to_string()
    }
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the vector is exported, then a bar over
/// the raster jobs. Raster jobs may finish out of order.
struct CliProgress {
    bar: ProgressBar,
    raster_errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            raster_errors: AtomicUsize::new(0),
        })
    }
}

impl ConversionObserver for CliProgress {
    fn on_cache_lookup(&self, _key: &las2geo::CacheKey, hit: bool) {
        if hit {
            self.bar.println(format!(
                "{} {}",
                styled(Style::Cyan, "◆"),
                styled(Style::Dim, "reusing cached outcome")
            ));
        }
    }

    fn on_vector_export_start(&self, job: &VectorExportJob) {
        self.bar.set_prefix("Exporting");
        self.bar.set_message(job.vector_path.display().to_string());
    }

    fn on_vector_ready(&self, path: &Path, exported: bool) {
        let verb = if exported { "exported" } else { "reusing" };
        self.bar.println(format!(
            "  {} {} {}",
            styled(Style::Green, "✓"),
            verb,
            path.display()
        ));
    }

    fn on_vector_missing(&self, path: &Path) {
        self.bar
            .println(format!("  {} {} does not exist", styled(Style::Red, "✗"), path.display()));
    }

    fn on_raster_stage_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} rasters  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rasterising");
    }

    fn on_raster_start(&self, attribute: &str, _path: &Path) {
        self.bar.set_message(attribute.to_string());
    }

    fn on_raster_complete(&self, result: &RasterResult) {
        self.bar.println(format!(
            "  {} {:<16}  {}",
            styled(Style::Green, "✓"),
            result.attribute,
            styled(Style::Dim, &format!("{:.1}s", result.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_raster_error(&self, result: &RasterResult, error: &RasterError) {
        self.raster_errors.fetch_add(1, Ordering::SeqCst);
        let msg = error.to_string();
        // Truncate very long error messages to keep output tidy.
        let msg = match msg.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
            None => msg,
        };
        self.bar.println(format!(
            "  {} {:<16}  {}",
            styled(Style::Red, "✗"),
            result.attribute,
            styled(Style::Red, &msg)
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _source: &Path, _epsg: u32, outcome: &Outcome, _from_cache: bool) {
        self.bar.finish_and_clear();
        match outcome {
            Outcome::Success(report) => {
                let failed = self.raster_errors.load(Ordering::SeqCst);
                let mark = if failed == 0 {
                    styled(Style::Green, "✔")
                } else {
                    styled(Style::Cyan, "⚠")
                };
                eprintln!(
                    "{} {}  {} raster(s), {} failed  {}ms",
                    mark,
                    styled(Style::Bold, &report.vector_path.display().to_string()),
                    report.stats.rasters_written,
                    failed,
                    report.stats.total_duration_ms,
                );
            }
            Outcome::Failure(reason) => eprintln!("{} {}", styled(Style::Red, "✘"), reason),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Export plot1.las to ./plot1.shp (EPSG:32632)
  las2geo convert plot1.las --epsg 32632

  # Vector plus elevation and intensity rasters at 0.5 m
  las2geo convert plot1.las --epsg 32632 \
      --methods vector-export,raster-export \
      --attributes elevation,intensity --pixel-size 0.5

  # Rasters only, reusing an existing shapefile, plus a DEM
  las2geo convert plot1.las --epsg 32632 --methods raster-export --create-dem

  # Options from a JSON file (flags override file values)
  las2geo convert plot1.las --epsg 32632 --options opts.json

  # Search the web for the CRS of a file
  las2geo lookup NAD83_UTM_zone_17N.las

METHODS:
  vector-export   (legacy: las2shp)           Produce the point shapefile
  raster-export   (legacy: las2tif, shp2tif)  One GeoTIFF per attribute

ENVIRONMENT VARIABLES:
  LAS2GEO_EPSG               Default EPSG code
  LAS2GEO_METHODS            Comma-separated methods
  LAS2GEO_ATTRIBUTES         Comma-separated attributes
  LAS2GEO_PIXEL_SIZE         Raster cell size
  LAS2GEO_RASTER_CONCURRENCY Raster jobs in flight
  LAS2GEO_PDAL               pdal executable
  LAS2GEO_GDAL_RASTERIZE     gdal_rasterize executable
  RUST_LOG                   Override the log filter
"#;

/// Convert point clouds to shapefiles and GeoTIFFs.
#[derive(Parser, Debug)]
#[command(
    name = "las2geo",
    version,
    about = "Convert LAS/LAZ point clouds to shapefiles and GeoTIFF rasters",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LAS2GEO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "LAS2GEO_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a point-cloud file.
    Convert(ConvertArgs),
    /// Open a web search for the EPSG code of a file.
    Lookup {
        /// File name to search for.
        file_name: String,
        /// Print the search URL instead of opening a browser.
        #[arg(long)]
        print_only: bool,
    },
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Point-cloud source file.
    source: PathBuf,

    /// EPSG code of the source coordinates.
    #[arg(long, env = "LAS2GEO_EPSG")]
    epsg: u32,

    /// Stages to run: vector-export, raster-export.
    #[arg(long, env = "LAS2GEO_METHODS", value_delimiter = ',')]
    methods: Option<Vec<String>>,

    /// Attributes to extract (elevation, intensity, classification, …).
    #[arg(long, env = "LAS2GEO_ATTRIBUTES", value_delimiter = ',')]
    attributes: Option<Vec<String>>,

    /// Vector output path. Default: ./<stem>.shp
    #[arg(long)]
    vector_path: Option<PathBuf>,

    /// Raster path prefix. Default: ./<stem>_
    #[arg(long)]
    raster_prefix: Option<String>,

    /// Raster cell size in CRS units.
    #[arg(long, env = "LAS2GEO_PIXEL_SIZE")]
    pixel_size: Option<f64>,

    /// Keep existing output files.
    #[arg(long)]
    no_overwrite: bool,

    /// Also write a DEM raster (with raster-export).
    #[arg(long)]
    create_dem: bool,

    /// JSON file with options; flags take precedence.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Raster jobs in flight at once.
    #[arg(long, env = "LAS2GEO_RASTER_CONCURRENCY", default_value_t = 1)]
    raster_concurrency: usize,

    /// pdal executable.
    #[arg(long, env = "LAS2GEO_PDAL", default_value = "pdal")]
    pdal: String,

    /// gdal_rasterize executable.
    #[arg(long, env = "LAS2GEO_GDAL_RASTERIZE", default_value = "gdal_rasterize")]
    gdal_rasterize: String,

    /// Print the outcome as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "LAS2GEO_NO_PROGRESS")]
    no_progress: bool,

    /// Exit with status 2 when any raster failed.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Lookup { .. } => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Lookup {
            file_name,
            print_only,
        } => {
            if print_only {
                println!("{}", epsg_search_url(&file_name));
            } else {
                lookup_epsg(&file_name).context("Failed to open a browser")?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Convert(args) => run_convert(args, show_progress, cli.quiet).await,
    }
}

async fn run_convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<ExitCode> {
    let options = build_options(&args).await?;

    let logger = Arc::new(ActionLogger::new());
    let mut observers = ObserverSet::new().with(logger);
    if show_progress {
        observers = observers.with(CliProgress::new());
    }

    let loader = las2geo::backend::pdal::PdalPointLoader::default().with_program(&args.pdal);
    let rasterizer =
        las2geo::backend::gdal::GdalRasterizer::new().with_program(&args.gdal_rasterize);

    let converter = Converter::builder()
        .point_loader(Arc::new(loader))
        .rasterizer(Arc::new(rasterizer))
        .observer(Arc::new(observers))
        .raster_concurrency(args.raster_concurrency)
        .build()
        .context("Invalid configuration")?;

    let request = ConvertRequest::new(&args.source, args.epsg, options);
    let outcome = converter
        .process(&request)
        .await
        .with_context(|| format!("Conversion of {} failed", args.source.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?;
        println!("{json}");
    } else if !quiet && !show_progress {
        // Only print inline stats when the progress observer is disabled.
        match &outcome {
            Outcome::Success(report) => {
                eprintln!(
                    "Converted {} → {} ({} raster(s)) in {}ms",
                    report.source.display(),
                    report.vector_path.display(),
                    report.stats.rasters_written,
                    report.stats.total_duration_ms
                );
                for failed in report.failed_rasters() {
                    if let Some(ref e) = failed.error {
                        eprintln!("  {}", e);
                    }
                }
            }
            Outcome::Failure(reason) => eprintln!("Conversion failed: {reason}"),
        }
    }

    Ok(match outcome.report() {
        None => ExitCode::from(1),
        Some(report) if args.strict && !report.is_complete() => ExitCode::from(2),
        Some(_) => ExitCode::SUCCESS,
    })
}

/// Options file first, then flags on top.
async fn build_options(args: &ConvertArgs) -> Result<RawOptions> {
    let mut options = match args.options {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read options from {:?}", path))?;
            RawOptions::from_json_str(&text)
                .with_context(|| format!("Failed to parse options in {:?}", path))?
        }
        None => RawOptions::new(),
    };

    if let Some(ref methods) = args.methods {
        options = options.methods(methods.iter().cloned());
    }
    if let Some(ref attributes) = args.attributes {
        options = options.extract_attributes(attributes.iter().cloned());
    }
    if let Some(ref path) = args.vector_path {
        options = options.vector_path(path.clone());
    }
    if let Some(ref prefix) = args.raster_prefix {
        options = options.raster_prefix(prefix.clone());
    }
    if let Some(size) = args.pixel_size {
        options = options.pixel_size(size);
    }
    if args.no_overwrite {
        options = options.overwrite(false);
    }
    if args.create_dem {
        options = options.create_dem(true);
    }
    Ok(options)
}
