use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use artist_catalog::cache::SqliteSource;
use artist_catalog::progress::{format_duration, set_log_only};
use artist_catalog::safety::check_cache_output;
use artist_catalog::scoring::Deviation;
use artist_catalog::{build_catalog, Catalog, CatalogConfig};

#[derive(Parser, Debug)]
#[command(name = "artist-catalog")]
#[command(about = "Build a deduplicated artist catalog from a cache of recorded metadata API responses")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a recorded API dump (JSON) into a fresh cache database
    Import(ImportArgs),

    /// Assemble and reconcile one artist's catalog from a cache database
    Build(BuildArgs),
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Recorded API dump (JSON)
    dump: PathBuf,

    /// Cache database to create (name must contain "cache"; replaced if present)
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct BuildArgs {
    /// Cache database created by `import`
    cache: PathBuf,

    /// Artist name, matched exactly
    #[arg(long)]
    artist: String,

    /// JSON file with fetch and reconcile settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of most popular tracks whose audio features are printed
    #[arg(long, default_value_t = 10)]
    top: usize,

    #[arg(long)]
    search_limit: Option<usize>,

    #[arg(long)]
    top_tracks_limit: Option<usize>,

    #[arg(long)]
    album_page_size: Option<usize>,

    #[arg(long)]
    album_track_page_size: Option<usize>,

    /// IDs per general track-info request (default: 50)
    #[arg(long)]
    track_page_size: Option<usize>,

    /// IDs per audio-feature request (default: 100)
    #[arg(long)]
    feature_page_size: Option<usize>,

    /// |z| above which an audio-feature value counts as an outlier (default: 1.0)
    #[arg(long)]
    z_cutoff: Option<f64>,

    /// Use population instead of sample standard deviation
    #[arg(long)]
    population_std: bool,

    /// Write build statistics as JSON
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Hide progress bars and log progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Reconciliation threads (0 = rayon default)
    #[arg(long, default_value = "0")]
    workers: usize,
}

impl BuildArgs {
    fn catalog_config(&self) -> Result<CatalogConfig> {
        let mut config: CatalogConfig = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?;
                serde_json::from_str(&text).with_context(|| format!("Invalid config {:?}", path))?
            }
            None => CatalogConfig::default(),
        };

        let fetch = &mut config.fetch;
        let overrides = [
            (self.search_limit, &mut fetch.search_limit),
            (self.top_tracks_limit, &mut fetch.top_tracks_limit),
            (self.album_page_size, &mut fetch.album_page_size),
            (self.album_track_page_size, &mut fetch.album_track_page_size),
            (self.track_page_size, &mut fetch.track_page_size),
            (self.feature_page_size, &mut fetch.feature_page_size),
        ];
        for (flag, slot) in overrides {
            if let Some(value) = flag {
                *slot = value;
            }
        }

        if let Some(z_cutoff) = self.z_cutoff {
            config.reconcile.z_cutoff = z_cutoff;
        }
        if self.population_std {
            config.reconcile.deviation = Deviation::Population;
        }

        config.validate()?;
        Ok(config)
    }
}

fn run_import(args: ImportArgs) -> Result<()> {
    let start = Instant::now();

    if !args.dump.exists() {
        bail!("Dump not found: {:?}", args.dump);
    }
    check_cache_output(&args.output, &args.dump)?;

    if args.output.exists() {
        std::fs::remove_file(&args.output)
            .context("Failed to remove existing cache database")?;
    }

    println!("Creating cache database: {:?}", args.output);
    let mut source = SqliteSource::open(&args.output)
        .context("Failed to create cache database")?;
    let stats = source
        .import_file(&args.dump)
        .with_context(|| format!("Failed to import {:?}", args.dump))?;

    println!("\n{:=<60}", "");
    println!("Import complete!");
    println!("  Payloads: {}", stats.objects);
    println!("  Links: {}", stats.links);
    println!("  Skipped (no id): {}", stats.skipped);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}

fn print_summary(catalog: &Catalog, top: usize) {
    let report = &catalog.report;

    println!("\n{:=<60}", "");
    println!("Catalog complete!");
    if let Some(artist) = catalog.artist() {
        println!("  Artist: {} ({} followers)", artist.artist, artist.followers);
    }
    println!("  Top songs: {}", catalog.top_songs.len());
    println!("  Albums: {}", catalog.albums.len());
    println!(
        "  Track info: {} rows -> {} tracks ({} duplicate groups)",
        report.track_info.input_rows, report.track_info.output_rows, report.track_info.duplicate_groups
    );
    println!(
        "  Audio features: {} rows -> {} tracks ({} outliers dropped, {} fallbacks)",
        report.audio_features.input_rows,
        report.audio_features.output_rows,
        report.audio_features.rows_discarded,
        report.audio_features.fallback_groups
    );
    println!("  Elapsed: {:.2}s", report.elapsed_seconds);
    println!("{:=<60}", "");

    let rows = catalog.filter_by_popularity(top);
    if rows.is_empty() {
        return;
    }
    println!("\nTop {} by popularity:", rows.len());
    for row in rows {
        let f = &row.features;
        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v));
        println!(
            "  {:<40} energy={} valence={} danceability={} tempo={}",
            row.name,
            show(f.energy),
            show(f.valence),
            show(f.danceability),
            show(f.tempo)
        );
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let config = args.catalog_config()?;

    if !args.cache.exists() {
        bail!("Cache database not found: {:?}", args.cache);
    }
    println!("Opening cache database: {:?}", args.cache);
    let source = SqliteSource::open(&args.cache).context("Failed to open cache database")?;

    let catalog = build_catalog(&source, &args.artist, &config)
        .with_context(|| format!("Failed to build catalog for '{}'", args.artist))?;

    print_summary(&catalog, args.top);

    if args.log_only {
        catalog.report.log_phase("build");
    }
    if let Some(path) = &args.stats {
        catalog
            .report
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {:?}", path))?;
        println!("Stats written to {:?}", path);
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().cmd {
        Command::Import(args) => run_import(args),
        Command::Build(args) => run_build(args),
    }
}
