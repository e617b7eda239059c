//! Review beginner Python code with a local language model.
//!
//! Every file named on the command line gets a `<stem>.md` feedback document
//! next to it. With no files (or a lone `-`), code is read from stdin and the
//! feedback is printed to stdout.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use pyreview::exit_codes;
use pyreview::io::config::{
    ConfigOverrides, DEFAULT_CONFIG_FILE, ReviewConfig, apply_overrides, load_config,
    load_explicit_config,
};
use pyreview::io::hf::HfModel;
use pyreview::io::source::load_sources;
use pyreview::io::writer::FeedbackExists;
use pyreview::logging;
use pyreview::review::{ReviewSettings, run_review};

#[derive(Parser, Debug)]
#[command(
    name = "pyreview",
    version,
    about = "Batched LLM feedback for beginner Python code"
)]
struct Cli {
    /// Python files or Jupyter notebooks to review. Reads stdin if omitted or `-`.
    files: Vec<PathBuf>,

    /// Hugging Face model id or local model directory.
    #[arg(long)]
    model: Option<String>,

    /// Overwrite existing feedback files.
    #[arg(short, long)]
    force: bool,

    /// Extra instruction for the reviewer. May be repeated.
    #[arg(long = "nudge", value_name = "TEXT")]
    nudges: Vec<String>,

    /// Text prepended to every feedback document; `{model}` is replaced by the model id.
    #[arg(long, value_name = "TEMPLATE")]
    prefix: Option<String>,

    /// Append the reviewed code below the feedback.
    #[arg(long = "withcode")]
    with_code: bool,

    /// Config file (defaults to `pyreview.toml` if present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run the model on the CPU even if a GPU is available.
    #[arg(long)]
    cpu: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        let code = if err.downcast_ref::<FeedbackExists>().is_some() {
            exit_codes::FEEDBACK_EXISTS
        } else {
            exit_codes::FAILED
        };
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    let sources = load_sources(&cli.files)?;
    let settings = ReviewSettings::from_config(&config, cli.nudges, cli.with_code, cli.force);

    // Fail on existing feedback before paying for a model load.
    settings.feedback_writer().preflight(&sources)?;

    let mut model = HfModel::load(&config.model, &config.revision, config.generation.cpu)?;
    let stdout = std::io::stdout();
    let outcome = run_review(&mut model, sources, &settings, &mut stdout.lock())?;
    info!(items = outcome.destinations.len(), "review complete");
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<ReviewConfig> {
    let base = match &cli.config {
        Some(path) => load_explicit_config(path)?,
        None => load_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    let overrides = ConfigOverrides {
        model: cli.model.clone(),
        prefix: cli.prefix.clone(),
        cpu: cli.cpu,
    };
    apply_overrides(base, &overrides)
}
