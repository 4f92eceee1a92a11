//! terraclass CLI - unsupervised land-cover classification of multi-band rasters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use terraclass_algorithms::classification::{
    classify_stack, pca_stack, ClassifyParams, Generator, KmeansParams, PcaParams, PcaResult,
};
use terraclass_colormap::{labels_to_rgba, ClassPalette, ColorScheme};
use terraclass_core::io::{read_geotiff, write_geotiff, write_rgba_geotiff, GeoTiffOptions};
use terraclass_core::{Raster, RasterStack};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "terraclass")]
#[command(author, version, about = "Unsupervised land-cover classification", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a stack of single-band rasters
    Info {
        /// Band files, in stack order
        #[arg(required = true)]
        bands: Vec<PathBuf>,
        /// No-data value shared by all bands (default: taken from the first band)
        #[arg(long)]
        nodata: Option<f64>,
    },
    /// Principal components of a band stack, one raster per component
    Pca {
        /// Band files, in stack order
        #[arg(required = true)]
        bands: Vec<PathBuf>,
        /// Output directory for the component rasters
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Cumulative explained variance to retain (0 < t <= 1)
        #[arg(short, long, default_value = "0.99")]
        threshold: f64,
        /// Divide each band by its standard deviation before decomposition
        #[arg(long)]
        scale: bool,
        /// File name prefix for the component rasters
        #[arg(long, default_value = "PC")]
        prefix: String,
        /// No-data value shared by all bands (default: taken from the first band)
        #[arg(long)]
        nodata: Option<f64>,
    },
    /// Cluster a band stack into land-cover classes
    Classify {
        /// Band files, in stack order
        #[arg(required = true)]
        bands: Vec<PathBuf>,
        /// Output label raster
        #[arg(short, long)]
        output: PathBuf,
        /// Number of classes
        #[arg(short = 'k', long, default_value = "6")]
        clusters: usize,
        /// Maximum K-means iterations
        #[arg(long, default_value = "300")]
        max_iter: usize,
        /// Convergence tolerance on centroid movement
        #[arg(long, default_value = "1e-4")]
        tolerance: f64,
        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Maximum number of training pixels
        #[arg(long, default_value = "10000")]
        sample_cap: usize,
        /// Random stream: rand48, java
        #[arg(short, long, default_value = "rand48")]
        generator: String,
        /// Cluster principal components retaining this much variance instead of raw bands
        #[arg(long)]
        pca_threshold: Option<f64>,
        /// Scale bands by their standard deviation before PCA
        #[arg(long, requires = "pca_threshold")]
        scale: bool,
        /// Majority filter window width (odd, >= 3); 0 disables smoothing
        #[arg(short = 'w', long, default_value = "0")]
        smoothing_window: usize,
        /// Also write the unsmoothed labels here when smoothing is enabled
        #[arg(long)]
        raw_output: Option<PathBuf>,
        /// No-data value of the input bands and of the output labels
        /// [default: the first band's own no-data for the input, -9999 for the output]
        #[arg(short, long, allow_hyphen_values = true)]
        nodata: Option<i32>,
    },
    /// Render a label raster as an RGBA GeoTIFF
    Render {
        /// Input label raster
        input: PathBuf,
        /// Output RGBA GeoTIFF
        output: PathBuf,
        /// Color scheme used when no palette is given: land-cover, terrain, ndvi, grayscale, viridis
        #[arg(long, default_value = "land-cover")]
        scheme: String,
        /// Comma-separated hex colors for classes 0, 1, 2, ...
        #[arg(short, long, value_delimiter = ',')]
        palette: Option<Vec<String>>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Read every band and stack them; `nodata` overrides the sentinel of the first band
fn read_stack(paths: &[PathBuf], nodata: Option<f64>) -> Result<RasterStack<f64>> {
    let pb = spinner("Reading bands...");
    let bands = paths
        .iter()
        .map(|path| {
            read_geotiff::<f64, _>(path)
                .with_context(|| format!("Failed to read band {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();

    let nodata = nodata.or_else(|| bands.first().and_then(|b| b.nodata()));
    let stack = RasterStack::new(bands, nodata).context("Failed to stack bands")?;
    let (rows, cols) = stack.shape();
    info!("Input: {} bands, {} x {}", stack.n_bands(), cols, rows);
    Ok(stack)
}

fn write_labels(raster: &Raster<i32>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_generator(s: &str) -> Result<Generator> {
    match s.to_lowercase().as_str() {
        "rand48" | "drand48" | "posix" => Ok(Generator::Rand48),
        "java" => Ok(Generator::Java),
        _ => anyhow::bail!("Unknown generator: {}. Use rand48 or java.", s),
    }
}

fn print_variance_report(result: &PcaResult) {
    println!("\nComponent  Eigenvalue      Explained  Cumulative");
    for (i, eigenvalue) in result.all_eigenvalues.iter().enumerate() {
        let marker = if i < result.n_components() { "*" } else { " " };
        println!(
            "{}PC{:<8} {:<15.6} {:>8.4}%  {:>9.4}%",
            marker,
            i + 1,
            eigenvalue,
            100.0 * result.explained_variance_ratio[i],
            100.0 * result.cumulative_variance[i]
        );
    }
    println!(
        "Selected {} of {} components ({:.4}% of variance)",
        result.n_components(),
        result.all_eigenvalues.len(),
        100.0 * result.retained_variance()
    );
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { bands, nodata } => {
            let stack = read_stack(&bands, nodata)?;
            let (rows, cols) = stack.shape();
            let bounds = stack.bands()[0].bounds();

            println!("Bands: {}", stack.n_bands());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, stack.len());
            println!("Cell size: {}", stack.bands()[0].cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = stack.nodata() {
                println!("NoData: {}", nodata);
            }

            for (path, band) in bands.iter().zip(stack.bands()) {
                let mut band = band.clone();
                band.set_nodata(stack.nodata());
                let stats = band.statistics();
                println!("\n{}:", path.display());
                if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                    println!("  Min: {:.4}  Max: {:.4}  Mean: {:.4}", min, max, mean);
                }
                println!("  Valid cells: {}", stats.valid_count);
            }

            let valid = stack.valid_count();
            println!(
                "\nValid in every band: {} ({:.1}%)",
                valid,
                100.0 * valid as f64 / stack.len() as f64
            );
        }

        // ── PCA ──────────────────────────────────────────────────────
        Commands::Pca {
            bands,
            output_dir,
            threshold,
            scale,
            prefix,
            nodata,
        } => {
            let stack = read_stack(&bands, nodata)?;
            let params = PcaParams {
                variance_threshold: threshold,
                scale,
            };

            let start = Instant::now();
            let pcs = pca_stack(&stack, &params).context("Failed to compute principal components")?;
            let elapsed = start.elapsed();

            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            let pb = spinner("Writing components...");
            for (i, component) in pcs.components.iter().enumerate() {
                let path = output_dir.join(format!("{}{}.tif", prefix, i + 1));
                write_geotiff(component, &path, Some(GeoTiffOptions::default()))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            pb.finish_and_clear();

            print_variance_report(&pcs.result);
            done("Principal components", &output_dir, elapsed);
        }

        // ── Classify ─────────────────────────────────────────────────
        Commands::Classify {
            bands,
            output,
            clusters,
            max_iter,
            tolerance,
            seed,
            sample_cap,
            generator,
            pca_threshold,
            scale,
            smoothing_window,
            raw_output,
            nodata,
        } => {
            let params = ClassifyParams {
                kmeans: KmeansParams {
                    n_clusters: clusters,
                    max_iterations: max_iter,
                    tolerance,
                    seed,
                    sample_cap,
                    generator: parse_generator(&generator)?,
                },
                pca: pca_threshold.map(|variance_threshold| PcaParams {
                    variance_threshold,
                    scale,
                }),
                smoothing_window,
                nodata_value: nodata.unwrap_or(ClassifyParams::default().nodata_value),
            };
            params.validate().context("Invalid classification parameters")?;

            let stack = read_stack(&bands, nodata.map(f64::from))?;
            let start = Instant::now();
            let result = classify_stack(&stack, &params).context("Failed to classify")?;
            let elapsed = start.elapsed();

            if let Some(pca) = &result.pca {
                print_variance_report(pca);
            }
            let model = &result.clustering.model;
            info!(
                "{} iterations, converged: {}, {} training pixels",
                model.iterations, model.converged, result.clustering.training_size
            );
            println!("\nClass  Pixels");
            for (class, count) in result.counts().iter().enumerate() {
                println!("{:<6} {}", class, count);
            }

            write_labels(result.output(), &output)?;
            if let (Some(path), Some(_)) = (&raw_output, &result.smoothed) {
                write_labels(&result.labels, path)?;
            }
            done("Classification", &output, elapsed);
        }

        // ── Render ───────────────────────────────────────────────────
        Commands::Render {
            input,
            output,
            scheme,
            palette,
        } => {
            let pb = spinner("Reading labels...");
            let labels: Raster<i32> = read_geotiff(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            pb.finish_and_clear();

            let palette = match palette {
                Some(colors) => {
                    let colors: Vec<&str> = colors.iter().map(String::as_str).collect();
                    ClassPalette::from_hex(&colors).context("Invalid palette")?
                }
                None => {
                    let scheme = ColorScheme::from_name(&scheme).context("Invalid scheme")?;
                    let n_classes = labels.statistics().max.map_or(0, |max| max.max(-1) + 1);
                    ClassPalette::from_scheme(scheme, n_classes as usize)
                }
            };

            let start = Instant::now();
            let rgba = labels_to_rgba(&labels, &palette);
            let elapsed = start.elapsed();

            let pb = spinner("Writing output...");
            write_rgba_geotiff(&rgba, labels.rows(), labels.cols(), labels.transform(), &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            pb.finish_and_clear();

            for (class, color) in palette.entries() {
                println!("{:<6} {}", class, color.to_hex());
            }
            done("Rendering", &output, elapsed);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generator() {
        assert_eq!(parse_generator("rand48").unwrap(), Generator::Rand48);
        assert_eq!(parse_generator("JAVA").unwrap(), Generator::Java);
        assert!(parse_generator("mt19937").is_err());
    }

    #[test]
    fn test_classify_args() {
        let cli = Cli::try_parse_from([
            "terraclass", "classify", "b1.tif", "b2.tif", "-o", "out.tif", "-k", "4",
            "--pca-threshold", "0.95", "--nodata", "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Classify { bands, clusters, pca_threshold, nodata, .. } => {
                assert_eq!(bands.len(), 2);
                assert_eq!(clusters, 4);
                assert_eq!(pca_threshold, Some(0.95));
                assert_eq!(nodata, Some(-1));
            }
            _ => panic!("expected classify"),
        }

        let cli = Cli::try_parse_from(["terraclass", "classify", "b1.tif", "-o", "out.tif"]).unwrap();
        match cli.command {
            Commands::Classify { nodata, .. } => assert_eq!(nodata, None),
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn test_read_stack_keeps_band_nodata() {
        let path = std::env::temp_dir().join(format!("terraclass_band_nodata_{}.tif", std::process::id()));
        let mut band: Raster<f64> = Raster::from_vec(vec![0.0, 3.0, 5.0, 0.0], 2, 2).unwrap();
        band.set_nodata(Some(0.0));
        write_geotiff(&band, &path, None).unwrap();

        let stack = read_stack(std::slice::from_ref(&path), None).unwrap();
        assert_eq!(stack.nodata(), Some(0.0));
        assert_eq!(stack.valid_count(), 2);

        let stack = read_stack(std::slice::from_ref(&path), Some(-9999.0)).unwrap();
        assert_eq!(stack.nodata(), Some(-9999.0));
        assert_eq!(stack.valid_count(), 4);

        std::fs::remove_file(&path).unwrap();
    }
}
