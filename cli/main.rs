#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use concord::io::{self, TableFormat};
use concord::progress::{ScoringProgressObserver, ScoringStage};
use concord::{BridgingScorer, NoteScore, NoteStatus, ScorerConfig, classify};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

/// Seed used when `--seed` is not given, so repeated runs agree by default.
const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormatCli {
    Tsv,
    Csv,
    Json,
}

impl From<OutputFormatCli> for TableFormat {
    fn from(format: OutputFormatCli) -> Self {
        match format {
            OutputFormatCli::Tsv => Self::Tsv,
            OutputFormatCli::Csv => Self::Csv,
            OutputFormatCli::Json => Self::Json,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "concord",
    version,
    about = "Bridging-based helpfulness scoring for community notes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score every note in a rating table
    #[command(about = "Score notes from a rating table (outputs: <RATINGS>.scores.tsv)")]
    Score {
        /// Rating table with note_id, rater_did and helpfulness columns (.tsv, .csv or .json)
        #[arg(value_name = "RATINGS")]
        ratings: PathBuf,

        /// Where to write the score table
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Output format; inferred from --output when omitted
        #[arg(long, value_enum)]
        format: Option<OutputFormatCli>,

        /// TOML configuration overriding the default policy
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Seed for the factor initialization
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Number of full-batch Adam epochs
        #[arg(long, value_name = "N")]
        epochs: Option<usize>,

        /// Stop once the gradient norm falls below this value
        #[arg(long, value_name = "X")]
        early_stop_tolerance: Option<f64>,
    },

    /// Print or save the default configuration
    #[command(about = "Print the default configuration as TOML")]
    Config {
        /// Write the configuration to this file instead of stdout
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Classify a single (intercept, factor) pair
    #[command(about = "Print the status for one fitted (intercept, factor) pair")]
    Classify {
        #[arg(long, allow_hyphen_values = true)]
        intercept: f64,

        #[arg(long, allow_hyphen_values = true)]
        factor: f64,
    },
}

/// Drives an indicatif bar from scoring progress callbacks. The bar is hidden
/// when stderr is not a terminal.
struct CliProgress {
    bar: Option<ProgressBar>,
}

impl CliProgress {
    fn new() -> Self {
        Self { bar: None }
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) =
        ProgressStyle::with_template("\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

impl ScoringProgressObserver for CliProgress {
    fn on_stage_start(&mut self, stage: ScoringStage, total: usize) {
        // Only the fit is long enough to deserve a bar.
        if stage == ScoringStage::Fitting {
            self.bar = Some(create_progress_bar(total as u64, &stage.to_string()));
        }
    }

    fn on_stage_advance(&mut self, stage: ScoringStage, processed: usize) {
        if stage == ScoringStage::Fitting {
            if let Some(bar) = &self.bar {
                bar.set_position(processed as u64);
            }
        }
    }

    fn on_stage_finish(&mut self, stage: ScoringStage) {
        if stage == ScoringStage::Fitting {
            if let Some(bar) = self.bar.take() {
                bar.finish_and_clear();
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Score {
            ratings,
            output,
            format,
            config,
            seed,
            epochs,
            early_stop_tolerance,
        }) => run_score(
            ratings,
            output,
            format,
            config,
            seed,
            epochs,
            early_stop_tolerance,
        ),
        Some(Commands::Config { output }) => run_config(output),
        Some(Commands::Classify { intercept, factor }) => {
            println!("{}", classify(intercept, factor));
            Ok(())
        }
        None => match Cli::command().print_help() {
            Ok(()) => {
                println!();
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_score(
    ratings_path: PathBuf,
    output: Option<PathBuf>,
    format: Option<OutputFormatCli>,
    config_path: Option<PathBuf>,
    seed: u64,
    epochs: Option<usize>,
    early_stop_tolerance: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &config_path {
        Some(path) => {
            println!("Loading configuration from: {}", path.display());
            ScorerConfig::load(path)?
        }
        None => ScorerConfig::default(),
    };
    if let Some(epochs) = epochs {
        config.fit.epochs = epochs;
    }
    if early_stop_tolerance.is_some() {
        config.fit.early_stop_tolerance = early_stop_tolerance;
    }
    let scorer = BridgingScorer::new(config)?;

    let format: TableFormat = match (format, &output) {
        (Some(format), _) => format.into(),
        (None, Some(path)) => TableFormat::from_path(path),
        (None, None) => TableFormat::Tsv,
    };
    let output_path = output.unwrap_or_else(|| io::default_output_path(&ratings_path, format));

    println!("Loading ratings from: {}", ratings_path.display());
    let ratings = io::load_ratings(&ratings_path)?;
    println!("Loaded {} ratings", ratings.len());

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut progress = CliProgress::new();
    let scores = scorer.score_with_progress(&ratings, &mut rng, &mut progress);

    io::save_scores(&output_path, &scores, format)?;
    print_summary(&scores);
    println!(
        "Scores for {} notes saved to: {} ({:.2?})",
        scores.len(),
        output_path.display(),
        start.elapsed()
    );
    Ok(())
}

fn run_config(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ScorerConfig::default();
    match output {
        Some(path) => {
            config.save(&path)?;
            println!("Default configuration saved to: {}", path.display());
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}

fn print_summary(scores: &[NoteScore]) {
    let tally = scores.iter().map(|score| score.status).counts();
    for status in [
        NoteStatus::CurrentlyRatedHelpful,
        NoteStatus::CurrentlyRatedNotHelpful,
        NoteStatus::NeedsMoreRatings,
    ] {
        println!(
            "  {:<5} {}",
            status.code(),
            tally.get(&status).copied().unwrap_or(0)
        );
    }
}
