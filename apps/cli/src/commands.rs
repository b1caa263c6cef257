//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use webresolve_core::{CandidateOutcome, Resolution, ResolveProgress, WebResolver};
use webresolve_shared::{
    AppConfig, ResolutionConfig, SearchVariant, Strategy, init_config, init_config_at,
    load_config, load_config_from, validate_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// WebResolve: answer questions from the web.
#[derive(Parser)]
#[command(
    name = "webresolve",
    version,
    about = "Resolve a question to a single best answer using web search and a language model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.webresolve/webresolve.toml.
    #[arg(long, global = true, env = "WEBRESOLVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Resolve a question to an answer.
    Ask {
        /// The question or task text.
        question: String,

        /// Treat the question as a short natural-language clarification.
        #[arg(long)]
        natural: bool,

        /// Print confidence, source, and per-candidate outcomes.
        #[arg(long)]
        report: bool,

        /// Print the full resolution as JSON.
        #[arg(long, conflicts_with = "report")]
        json: bool,

        #[command(flatten)]
        overrides: ResolutionOverrides,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-invocation overrides of the `[resolution]` config section.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct ResolutionOverrides {
    /// Delay between candidates in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Confidence an answer must exceed to stop early.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum number of search results to evaluate.
    #[arg(long)]
    pub max_candidates: Option<usize>,
}

impl ResolutionOverrides {
    /// Apply the overrides and re-validate the result.
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(delay_ms) = self.delay_ms {
            config.resolution.delay_ms = delay_ms;
        }
        if let Some(threshold) = self.threshold {
            config.resolution.threshold = threshold;
        }
        if let Some(max_candidates) = self.max_candidates {
            config.resolution.max_candidates = max_candidates;
        }
        validate_config(config)?;
        Ok(())
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "webresolve=info",
        1 => "webresolve=debug",
        _ => "webresolve=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ask {
            question,
            natural,
            report,
            json,
            overrides,
        } => {
            let variant = if natural {
                SearchVariant::NaturalLanguage
            } else {
                SearchVariant::Web
            };
            let output = match (report, json) {
                (_, true) => Output::Json,
                (true, false) => Output::Report,
                (false, false) => Output::Answer,
            };
            cmd_ask(config_path, &question, variant, output, &overrides).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path).await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// How `ask` prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Answer,
    Report,
    Json,
}

fn load(config_path: Option<PathBuf>) -> Result<AppConfig> {
    Ok(match config_path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    variant: SearchVariant,
    output: Output,
    overrides: &ResolutionOverrides,
) -> Result<()> {
    let mut config = load(config_path)?;
    overrides.apply(&mut config)?;

    let resolution_config = ResolutionConfig::from(&config);
    info!(
        variant = variant.as_str(),
        threshold = resolution_config.threshold,
        delay_ms = resolution_config.delay.as_millis() as u64,
        max_candidates = resolution_config.max_candidates,
        "resolving question"
    );

    let resolver = WebResolver::with_resolution(&config, resolution_config)?;

    let reporter = CliProgress::new();
    let resolution = resolver.resolve(question, variant, &reporter).await?;

    match output {
        Output::Answer => println!("{}", resolution.answer),
        Output::Report => print_report(&resolution),
        Output::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
    }

    Ok(())
}

fn print_report(resolution: &Resolution) {
    println!();
    println!("  Answer:     {}", resolution.answer);
    match resolution.confidence {
        Some(confidence) => println!("  Confidence: {confidence:.2}"),
        None => println!("  Confidence: -"),
    }
    println!(
        "  Strategy:   {}",
        resolution.strategy.map_or("-", |s| s.as_str())
    );
    println!(
        "  Source:     {}",
        resolution.source_url.as_deref().unwrap_or("-")
    );
    println!(
        "  Threshold:  {}",
        if resolution.threshold_met { "met" } else { "not met" }
    );
    println!("  Query:      {}", resolution.search_query);
    println!("  Time:       {:.1}s", resolution.elapsed.as_secs_f64());
    println!();

    for report in &resolution.candidates {
        let detail = match &report.outcome {
            CandidateOutcome::Accepted {
                confidence,
                tie_break: true,
            } => format!("accepted {confidence:.2} (tie-break)"),
            CandidateOutcome::Accepted { confidence, .. } => format!("accepted {confidence:.2}"),
            CandidateOutcome::Discarded { confidence, reason } => {
                format!("discarded {confidence:.2} ({reason:?})")
            }
            CandidateOutcome::Failed { stage, error } => format!("failed at {stage:?}: {error}"),
        };
        println!(
            "  [{:<6}] #{} {}  {detail}",
            report.strategy.as_str(),
            report.index + 1,
            report.url
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ResolveProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn candidate(&self, strategy: Strategy, current: usize, total: usize, url: &str) {
        self.spinner
            .set_message(format!("Evaluating ({strategy}) [{current}/{total}] {url}"));
    }

    fn done(&self, _resolution: &Resolution) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        // Fatal errors skip `done`; don't leave the spinner on screen.
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

async fn cmd_config_init(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            init_config_at(&path)?;
            path
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_overrides() {
        let cli = Cli::try_parse_from([
            "webresolve",
            "-vv",
            "ask",
            "How tall is the Eiffel tower?",
            "--natural",
            "--report",
            "--delay-ms",
            "0",
            "--max-candidates",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Ask {
            question,
            natural,
            report,
            json,
            overrides,
        } = cli.command
        else {
            panic!("expected ask");
        };
        assert_eq!(question, "How tall is the Eiffel tower?");
        assert!(natural && report && !json);
        assert_eq!(overrides.delay_ms, Some(0));
        assert_eq!(overrides.max_candidates, Some(3));
        assert_eq!(overrides.threshold, None);
    }

    #[tokio::test]
    async fn config_init_honors_config_flag() {
        let dir = std::env::temp_dir().join(format!("wr-cli-init-{}", std::process::id()));
        let path = dir.join("webresolve.toml");
        let cli = Cli::try_parse_from([
            "webresolve",
            "--config",
            path.to_str().unwrap(),
            "config",
            "init",
        ])
        .unwrap();

        run(cli).await.unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.resolution.threshold, 0.33);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn report_and_json_conflict() {
        assert!(Cli::try_parse_from(["webresolve", "ask", "q", "--report", "--json"]).is_err());
    }

    #[test]
    fn overrides_apply_and_validate() {
        let mut config = AppConfig::default();
        let overrides = ResolutionOverrides {
            delay_ms: Some(0),
            threshold: Some(0.5),
            max_candidates: None,
        };
        overrides.apply(&mut config).unwrap();
        assert_eq!(config.resolution.delay_ms, 0);
        assert_eq!(config.resolution.threshold, 0.5);
        assert_eq!(config.resolution.max_candidates, 5);

        let bad = ResolutionOverrides {
            threshold: Some(1.0),
            ..ResolutionOverrides::default()
        };
        assert!(bad.apply(&mut config).is_err());
    }
}
