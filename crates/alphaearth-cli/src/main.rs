//! `alphaearth`: local tools for AlphaEarth embedding GeoTIFFs.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

use alphaearth_catalog::{
    band_names, tile_size_for, CatalogError, DateRange, DownloadRequest, DownloaderConfig,
    TileGrid, TileName, LAST_YEAR, NUM_BANDS,
};
use alphaearth_raster::{
    discover_tiles, merge_directory, merge_files, DataType, Raster, RasterError,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, CliError>;

#[derive(Parser)]
#[command(name = "alphaearth", version, about = "AlphaEarth satellite embedding tools")]
struct Cli {
    /// Downloader defaults (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge downloaded tiles into one GeoTIFF
    Merge {
        /// Directory holding the tiles
        input_dir: PathBuf,
        /// Output file (defaults to <INPUT_DIR>.tif next to the directory)
        #[arg(long)]
        output_path: Option<PathBuf>,
        /// Delete the tiles after a successful merge
        #[arg(long)]
        delete_after: bool,
        /// Merge the whole directory or the listed files
        #[arg(long, value_enum, default_value_t = MergeMethod::Directory)]
        method: MergeMethod,
    },
    /// Convert a float GeoTIFF to one byte per band
    Quantize {
        input: PathBuf,
        output: PathBuf,
    },
    /// Convert a quantized GeoTIFF back to float32
    Dequantize {
        input: PathBuf,
        output: PathBuf,
    },
    /// Print a GeoTIFF profile as JSON
    Info {
        file: PathBuf,
    },
    /// Print the tiles a lon/lat download would export
    Plan {
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,
        /// Year to download
        #[arg(long, default_value_t = LAST_YEAR)]
        year: i32,
        /// Resolution in metres
        #[arg(long)]
        scale: Option<f64>,
        /// Output data type (uint8, float32, float64)
        #[arg(long, value_parser = parse_dtype)]
        dtype: Option<DataType>,
        /// Tile file prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Export only the first N bands
        #[arg(long)]
        bands: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MergeMethod {
    /// Discover tiles in the directory and remove it when deleting
    Directory,
    /// Merge the directory's tiles as a file list into --output-path
    Files,
}

#[derive(Serialize)]
struct Plan {
    crs: String,
    tile_size: f64,
    cols: usize,
    rows: usize,
    tiles: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            DownloaderConfig::load(path)?
        }
        None => DownloaderConfig::default(),
    };

    match cli.command {
        Commands::Merge {
            input_dir,
            output_path,
            delete_after,
            method,
        } => merge(&input_dir, output_path.as_deref(), delete_after, method),
        Commands::Quantize { input, output } => convert(&input, &output, |r| r.quantized()),
        Commands::Dequantize { input, output } => convert(&input, &output, |r| r.dequantized()),
        Commands::Info { file } => {
            let raster = Raster::open(&file)?;
            print_json(raster.profile())
        }
        Commands::Plan {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            year,
            scale,
            dtype,
            prefix,
            bands,
        } => {
            let mut request = DownloadRequest::latlon(
                DateRange::year(year)?,
                min_lat,
                max_lat,
                min_lon,
                max_lon,
                ".",
            )?
            .with_scale(scale.unwrap_or(config.scale))
            .with_dtype(dtype.unwrap_or(config.dtype));
            if let Some(prefix) = prefix {
                request = request.with_prefix(prefix);
            }
            if let Some(count) = bands {
                if count == 0 || count > NUM_BANDS {
                    return Err(CliError::Usage(format!(
                        "--bands must be between 1 and {}",
                        NUM_BANDS
                    )));
                }
                request = request.with_bands(band_names().into_iter().take(count));
            }
            print_json(&plan(&request, &config)?)
        }
    }
}

fn merge(
    input_dir: &Path,
    output_path: Option<&Path>,
    delete_after: bool,
    method: MergeMethod,
) -> Result<()> {
    let summary = match method {
        MergeMethod::Directory => merge_directory(input_dir, output_path, delete_after)?,
        MergeMethod::Files => {
            let output = output_path.ok_or_else(|| {
                CliError::Usage("--method files requires --output-path".to_string())
            })?;
            let inputs = discover_tiles(input_dir)?;
            merge_files(&inputs, output, delete_after)?
        }
    };
    info!(
        "Merged {} file(s) into {}",
        summary.inputs,
        summary.output.display()
    );
    print_json(&summary)
}

fn convert<F>(input: &Path, output: &Path, transform: F) -> Result<()>
where
    F: FnOnce(&Raster) -> alphaearth_raster::Result<Raster>,
{
    let raster = Raster::open(input)?;
    let converted = transform(&raster)?;
    converted.write_atomic(output)?;
    info!(
        "Wrote {} ({})",
        output.display(),
        converted.profile().dtype
    );
    Ok(())
}

fn plan(request: &DownloadRequest, config: &DownloaderConfig) -> Result<Plan> {
    request.validate()?;
    let extent = request
        .geometry
        .local_extent()
        .ok_or_else(|| CliError::Usage("request has no local extent".to_string()))?;
    let bands = request.selected_bands();
    let tile_size = tile_size_for(
        request.scale,
        bands.len(),
        request.dtype,
        request.crs,
        config.max_tile_bytes,
    )?;
    let grid = TileGrid::new(extent, tile_size)?;
    let tiles = grid
        .tiles()
        .map(|tile| TileName::new(request.prefix.as_deref(), request.dtype, tile).to_string())
        .collect();
    Ok(Plan {
        crs: request.crs.to_string(),
        tile_size,
        cols: grid.cols(),
        rows: grid.rows(),
        tiles,
    })
}

fn parse_dtype(s: &str) -> std::result::Result<DataType, String> {
    s.parse().map_err(|e: RasterError| e.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
