use anyhow::Context;
use clap::{Parser, Subcommand};
use spectral_align::config::{load_config_or_default, Config};
use spectral_align::logging::init_logging;
use spectral_align::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "align")]
#[command(about = "Frequency-domain registration of serial image stacks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML or JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Align every image of a directory onto a reference
    Run {
        /// Directory holding the images
        #[arg(short, long)]
        dir: PathBuf,

        /// Reference file name (defaults to the first image)
        #[arg(short, long)]
        reference: Option<String>,

        /// Worker threads (overrides the configuration)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Ignore stored alignments and register everything again
        #[arg(long)]
        recompute: bool,

        /// Only compute transforms, do not write aligned images
        #[arg(long)]
        no_write: bool,

        /// Write the batch report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Register a single target against a reference
    Pair {
        #[arg(short, long)]
        reference: PathBuf,

        #[arg(short = 'T', long)]
        target: PathBuf,

        /// Where to save the aligned target
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or clear the stored alignments of a reference
    Cache {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(short, long)]
        reference: String,

        /// Delete the store
        #[arg(long)]
        clear: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config_or_default(cli.config.as_deref().and_then(Path::to_str));
    match cli.verbose {
        0 => {}
        1 => config.logging.global_level = "info".to_string(),
        2 => config.logging.global_level = "debug".to_string(),
        _ => config.logging.global_level = "trace".to_string(),
    }
    if cli.verbose >= 2 {
        config.logging.engine_level = config.logging.global_level.clone();
        config.logging.cache_level = config.logging.global_level.clone();
    }
    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Run {
            dir,
            reference,
            threads,
            recompute,
            no_write,
            report,
        } => handle_run(&config, dir, reference, threads, recompute, !no_write, report),
        Commands::Pair {
            reference,
            target,
            output,
        } => handle_pair(&config, reference, target, output),
        Commands::Cache { dir, reference, clear } => handle_cache(dir, reference, clear),
    }
}

fn handle_run(
    config: &Config,
    dir: PathBuf,
    reference: Option<String>,
    threads: Option<usize>,
    recompute: bool,
    write_aligned: bool,
    report_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let source = FsImageSource::with_suffixes(&dir, config.image.suffixes.clone());
    let sink = PreprocessedDirSink::new(&dir, &config.image.output_dir);
    let options = BatchOptions {
        reference,
        recompute,
        threads: threads.unwrap_or(config.batch.threads),
        max_dimension: config.image.max_dimension,
        write_aligned,
    };

    let report = BatchAligner::new(&source, AlignmentCache::new(&dir), FrequencyAlignment::from_config(config))
        .with_sink(&sink)
        .with_options(options)
        .run()
        .with_context(|| format!("alignment of {} failed", dir.display()))?;

    println!("Reference: {}", report.reference);
    println!(
        "Targets: {} ({} from store, {} computed, {} failed)",
        report.targets.len(),
        report.cached.len(),
        report.computed.len(),
        report.failures.len()
    );
    for (target, state) in &report.targets {
        match state {
            AlignmentState::Computed { transform } => {
                let t = transform.translation();
                println!(
                    "  {:<32} rotation {:>8.3}°  shift ({:>8.2}, {:>8.2})  scale {:.4}",
                    target,
                    transform.rotation(),
                    t.dx,
                    t.dy,
                    transform.scale()
                );
            }
            AlignmentState::Failed { reason } => println!("  {:<32} FAILED: {}", target, reason),
            AlignmentState::NotYetComputed => println!("  {:<32} not computed", target),
        }
    }
    if write_aligned {
        println!("Aligned images written: {}", report.written);
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write report {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    if !report.is_clean() {
        anyhow::bail!("{} image(s) could not be aligned", report.failures.len());
    }
    Ok(())
}

fn handle_pair(config: &Config, reference: PathBuf, target: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let reference_image = open_raster(&reference)?;
    let target_image = open_raster(&target)?;

    let (h, w, _) = reference_image.dim();
    let factor = working_copy_factor((w as u32, h as u32), config.image.max_dimension);
    let reference_copy = rescale(&reference_image, factor)?;
    let target_copy = rescale(&target_image, factor)?;

    let identity = target.file_name().and_then(|n| n.to_str()).unwrap_or("target");
    let transform = FrequencyAlignment::from_config(config)
        .compute_traced(identity, reference_copy.view(), target_copy.view())?
        .rescaled(factor)?;

    println!("{}", serde_json::to_string_pretty(&transform)?);

    if let Some(path) = output {
        let aligned = apply(target_image.view(), &transform);
        to_dynamic(aligned.view())?
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        println!("Aligned image saved to {}", path.display());
    }
    Ok(())
}

fn handle_cache(dir: PathBuf, reference: String, clear: bool) -> anyhow::Result<()> {
    let cache = AlignmentCache::new(&dir);
    if clear {
        if cache.invalidate(&reference)? {
            println!("Removed {}", cache.path_for(&reference).display());
        } else {
            println!("No stored alignments for {}", reference);
        }
        return Ok(());
    }

    let record = cache.load(&reference)?;
    println!("{} ({} entries)", cache.path_for(&reference).display(), record.len());
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn open_raster(path: &Path) -> anyhow::Result<RasterImage> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(from_dynamic(&image)?)
}

fn rescale(image: &RasterImage, factor: f64) -> anyhow::Result<RasterImage> {
    if factor >= 1.0 {
        return Ok(image.clone());
    }
    let dynamic = to_dynamic(image.view())?;
    let width = ((dynamic.width() as f64 * factor).round() as u32).max(1);
    let height = ((dynamic.height() as f64 * factor).round() as u32).max(1);
    Ok(from_dynamic(&dynamic.resize_exact(
        width,
        height,
        image::imageops::FilterType::Triangle,
    ))?)
}
