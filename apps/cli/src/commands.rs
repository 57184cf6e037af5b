//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadpipe_core::{LeadPipeline, LeadScorer, summarize};
use leadpipe_shared::{
    AppConfig, LeadRecord, PipelineConfig, RawLead, init_config, load_config, load_config_from,
    resolve_db_path,
};
use leadpipe_storage::{BackupLog, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadPipe: score chatbot leads and deliver them to webhook, CRM and email.
#[derive(Parser)]
#[command(
    name = "leadpipe",
    version,
    about = "Score captured leads and deliver them to webhook, CRM and notification sinks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.leadpipe/leadpipe.toml).
    #[arg(long, global = true, env = "LEADPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Submit a raw lead (JSON) and wait until it is processed or failed.
    Submit {
        /// Path to the lead JSON, or `-` for stdin.
        input: String,
    },

    /// Score and tag a raw lead without delivering it.
    Score {
        /// Path to the lead JSON, or `-` for stdin.
        input: String,
    },

    /// List leads in the backup log, newest first.
    Leads {
        /// Maximum number of leads to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Summary statistics over the backup log.
    Analytics,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = [
        "leadpipe",
        "leadpipe_core",
        "leadpipe_sinks",
        "leadpipe_storage",
        "leadpipe_shared",
    ]
    .iter()
    .map(|target| format!("{target}={level}"))
    .collect::<Vec<_>>()
    .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Submit { input } => cmd_submit(config_path, &input).await,
        Command::Score { input } => cmd_score(config_path, &input),
        Command::Leads { limit } => cmd_leads(config_path, limit).await,
        Command::Analytics => cmd_analytics(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Read a raw lead from a file path or `-` for stdin.
fn read_raw_lead(input: &str) -> Result<RawLead> {
    let content = if input == "-" {
        std::io::read_to_string(std::io::stdin()).wrap_err("failed to read lead from stdin")?
    } else {
        std::fs::read_to_string(input).wrap_err_with(|| format!("failed to read {input}"))?
    };
    parse_raw_lead(&content)
}

fn parse_raw_lead(content: &str) -> Result<RawLead> {
    serde_json::from_str(content).map_err(|e| eyre!("invalid lead JSON: {e}"))
}

/// Open the backup log read-only, or `None` if nothing has been stored yet.
async fn open_backup_log(config: &AppConfig) -> Result<Option<BackupLog>> {
    let db_path = resolve_db_path(config)?;
    if !db_path.exists() {
        return Ok(None);
    }
    let storage = Storage::open_readonly(&db_path).await?;
    Ok(Some(BackupLog::new(
        Arc::new(storage),
        config.pipeline.backup_capacity,
    )))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_submit(config_path: Option<&Path>, input: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let raw = read_raw_lead(input)?;

    let pipeline_config = PipelineConfig::from(&config);
    let sinks = leadpipe_sinks::build_sinks(&config.sinks, &pipeline_config)?;
    let db_path = resolve_db_path(&config)?;
    let storage = Storage::open(&db_path).await?;

    let pipeline = LeadPipeline::new(
        pipeline_config,
        config.scoring.clone(),
        sinks,
        Arc::new(storage),
    )?;

    let ack = pipeline.submit(raw)?;
    info!(lead_id = %ack.lead_id, "lead submitted");

    let spinner = Spinner::new(&format!("Delivering {}", ack.lead_id));
    pipeline.flush().await;
    spinner.finish();

    let record = pipeline
        .backup_log()
        .find(&ack.lead_id)
        .await?
        .ok_or_else(|| {
            eyre!(
                "lead {} settled but is missing from the backup log",
                ack.lead_id
            )
        })?;

    print_record(&record);
    Ok(())
}

fn cmd_score(config_path: Option<&Path>, input: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let raw = read_raw_lead(input)?;
    raw.validate()?;

    let record = LeadRecord::from_raw(raw);
    let assessment = LeadScorer::new(config.scoring).assess(&record);
    println!("{}", serde_json::to_string_pretty(&assessment)?);
    Ok(())
}

async fn cmd_leads(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = resolve_config(config_path)?;
    let Some(log) = open_backup_log(&config).await? else {
        println!("No leads recorded yet.");
        return Ok(());
    };

    let leads = log.recent(limit).await?;
    if leads.is_empty() {
        println!("No leads recorded yet.");
        return Ok(());
    }

    println!();
    println!(
        "  {:<38} {:<24} {:<10} {:>5}  {}",
        "ID", "NAME", "STATUS", "SCORE", "SUBMITTED"
    );
    for lead in leads.iter().rev() {
        let score = lead
            .assessment
            .as_ref()
            .map(|a| a.score.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:<38} {:<24} {:<10} {:>5}  {}",
            lead.id.to_string(),
            truncate(&lead.name, 24),
            lead.status.as_str(),
            score,
            lead.timestamp.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    Ok(())
}

async fn cmd_analytics(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let records = match open_backup_log(&config).await? {
        Some(log) => log.entries().await?,
        None => Vec::new(),
    };

    let analytics = summarize(&records, &LeadScorer::new(config.scoring));
    println!("{}", serde_json::to_string_pretty(&analytics)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_record(record: &LeadRecord) {
    println!();
    println!("  Lead:     {}", record.id);
    println!("  Name:     {}", record.name);
    println!("  Status:   {}", record.status);
    if let Some(assessment) = &record.assessment {
        println!(
            "  Score:    {} ({})",
            assessment.score, assessment.priority
        );
        println!("  Tags:     {}", assessment.tags.join(", "));
    }
    println!("  Retries:  {}", record.retry_count);
    if let Some(error) = &record.last_error {
        println!("  Error:    {error}");
    }
    println!();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

// ---------------------------------------------------------------------------
// Progress spinner
// ---------------------------------------------------------------------------

struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_submit_with_global_flags() {
        let cli = Cli::parse_from([
            "leadpipe",
            "--log-format",
            "json",
            "-vv",
            "submit",
            "lead.json",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Submit { ref input } if input == "lead.json"));
    }

    #[test]
    fn raw_lead_json_uses_defaults() {
        let raw = parse_raw_lead(r#"{"name": "Ada", "email": "ada@example.org"}"#).unwrap();
        assert_eq!(raw.source, "chatbot");
        assert_eq!(raw.language, "en");
        assert!(raw.conversation_history.is_empty());
    }

    #[test]
    fn malformed_lead_json_is_rejected() {
        let err = parse_raw_lead("{\"name\": 1}").unwrap_err();
        assert!(err.to_string().contains("invalid lead JSON"));
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("Ada", 24), "Ada");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
