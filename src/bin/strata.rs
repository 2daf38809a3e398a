use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng as _;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strata", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite every image in a directory.
    Run(RunArgs),
    /// Print the plan a seed yields for one image, without rendering.
    Plan(PlanArgs),
    /// Load and validate a configuration file.
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Directory of source images.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Destination directory (created if missing).
    #[arg(long)]
    out: PathBuf,

    /// JSON configuration; unset fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Batch seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Maximum number of images in flight.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Output encoding.
    #[arg(long, value_enum, default_value_t = FormatChoice::Jpeg)]
    format: FormatChoice,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 95)]
    quality: u8,

    /// Category applied to every source (unknown names fall back to `default`).
    #[arg(long, default_value = "default")]
    category: String,

    /// Per-image processing budget in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Skip the framed border.
    #[arg(long)]
    no_border: bool,

    /// Border thickness in pixels.
    #[arg(long)]
    border_width: Option<u32>,

    /// Write one JSON line per processed image to this file.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Delete each source file once its composite was written.
    #[arg(long)]
    consume_sources: bool,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Source image.
    #[arg(long)]
    image: PathBuf,

    /// JSON configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Batch seed; the plan matches the first item of a batch run with the same seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Image category.
    #[arg(long, default_value = "default")]
    category: String,
}

#[derive(Parser, Debug)]
struct CheckConfigArgs {
    /// JSON configuration.
    #[arg(long)]
    config: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Png,
    Jpeg,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Plan(args) => cmd_plan(args),
        Command::CheckConfig(args) => cmd_check_config(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<strata::TransformConfig> {
    Ok(match path {
        Some(p) => strata::TransformConfig::from_path(p)?,
        None => strata::TransformConfig::default(),
    })
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(k) = args.concurrency {
        config.concurrency_limit = k;
    }
    if let Some(ms) = args.timeout_ms {
        config.item_timeout_ms = Some(ms);
    }
    if args.no_border {
        config.border_enabled = false;
    }
    if let Some(px) = args.border_width {
        config.border_width = px;
    }

    let category = strata::ImageCategory::parse(&args.category);
    let sources = strata::discover_sources(&args.in_dir, category)?;
    if sources.is_empty() {
        tracing::warn!(dir = %args.in_dir.display(), "no images found");
    }

    let encoding = match args.format {
        FormatChoice::Png => strata::OutputEncoding::Png,
        FormatChoice::Jpeg => strata::OutputEncoding::Jpeg {
            quality: args.quality,
        },
    };
    let sink = Arc::new(strata::DirectorySink::new(&args.out, encoding));

    let job = strata::BatchJob::new(sources, config, sink).with_seed(args.seed);
    let cancel = job.cancellation().clone();
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(sig, cancel.flag())
            .with_context(|| format!("register handler for signal {sig}"))?;
    }

    let mut manifest = match &args.manifest {
        Some(p) => Some(BufWriter::new(
            File::create(p).with_context(|| format!("create manifest '{}'", p.display()))?,
        )),
        None => None,
    };

    let mut stream = strata::BatchStreamProcessor::run(job)?;
    for report in stream.by_ref() {
        if let Some(w) = manifest.as_mut() {
            serde_json::to_writer(&mut *w, &report).context("write manifest line")?;
            w.write_all(b"\n").context("write manifest line")?;
        }
        if args.consume_sources && report.succeeded() {
            consume_source(&report.source);
        }
        eprintln!(
            "[{}/{}] {} {}",
            report.progress.processed,
            report.total,
            report.source,
            match (&report.output, &report.error) {
                (Some(out), _) => format!("-> {}", out.display()),
                (None, Some(err)) => format!("failed ({}): {}", err.kind, err.message),
                (None, None) => "done".to_owned(),
            }
        );
    }
    if let Some(mut w) = manifest {
        w.flush().context("flush manifest")?;
    }

    let summary = stream.summary();
    eprintln!(
        "{:?}: {} succeeded, {} failed, {} of {} processed",
        summary.state,
        summary.progress.succeeded,
        summary.progress.failed,
        summary.progress.processed,
        summary.progress.total
    );
    if let Some(fatal) = summary.fatal {
        anyhow::bail!(
            "batch stopped at item {} ({}): {}",
            fatal.index,
            fatal.source,
            fatal.error.message
        );
    }
    Ok(())
}

fn consume_source(source: &strata::SourceId) {
    if let strata::SourceId::Path(path) = source {
        if let Err(err) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), %err, "could not remove consumed source");
        }
    }
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    config.validate()?;

    let category = strata::ImageCategory::parse(&args.category);
    let handle = strata::SourceHandle::from_path(&args.image, category);
    let loader = strata::DecodeLoader::from_config(&config);
    let image = strata::SourceLoader::load(&loader, &handle)?;

    let seed = strata::item_seeds(args.seed).next().unwrap_or_default();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let plan = strata::TransformPlanner::plan(&image, category, &config, &mut rng)?;

    let json = serde_json::to_string_pretty(&plan).context("serialize plan")?;
    println!("{json}");
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    let config = strata::TransformConfig::from_path(&args.config)?;
    config.validate()?;
    println!("{} is valid", args.config.display());
    Ok(())
}
