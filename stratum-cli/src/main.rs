//! Stratum CLI: generate layered research reports from the terminal.

mod commands;

use clap::Parser;
use std::path::{Path, PathBuf};
use stratum_core::{ReportRunResult, ReportService, report_filename_for};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Stratum: layered web research and report generation
#[derive(Parser, Debug)]
#[command(name = "stratum", version, about, long_about = None)]
struct Cli {
    /// Report topic
    topic: Option<String>,

    /// LLM provider id (defaults to llm.default_provider)
    #[arg(long)]
    llm: Option<String>,

    /// Search provider id; repeat to combine several
    #[arg(long = "search")]
    search: Vec<String>,

    /// Output file (defaults to a topic-derived name in output.report_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List LLM and search providers with their availability
    Providers,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default workspace configuration file
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = stratum_core::config::data_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "stratum.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace).await;
    }

    let Some(topic) = cli.topic.filter(|t| !t.trim().is_empty()) else {
        anyhow::bail!("No topic given. Usage: stratum \"<topic>\" (see --help)");
    };

    let mut config = stratum_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let filename = match cli.output.as_deref() {
        Some(output) => {
            let (dir, name) = split_output(output)?;
            if let Some(dir) = dir {
                config.output.report_dir = dir;
            }
            name
        }
        None => report_filename_for(&topic),
    };

    let mut service = ReportService::new(config);
    if let Some(llm) = cli.llm {
        service = service.with_llm_provider(llm);
    }
    if !cli.search.is_empty() {
        service = service.with_search_providers(cli.search);
    }

    if !cli.quiet {
        eprintln!("Generating report: {topic}");
    }
    let result = service.generate_report(&topic, None).await;
    print_notices(&result);

    if let Some(error) = result.error {
        anyhow::bail!(error);
    }

    let path = service
        .save_report(&result.content, Some(&filename))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}", path.display());
    Ok(())
}

/// Split `--output` into an optional directory and a file name.
fn split_output(output: &Path) -> anyhow::Result<(Option<PathBuf>, String)> {
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid output path: {}", output.display()))?;
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf);
    Ok((dir, name))
}

fn print_notices(result: &ReportRunResult) {
    for notice in &result.notices {
        eprintln!("note: {notice}");
    }
    if let Some(llm) = &result.llm_provider_id {
        tracing::info!(
            llm = %llm,
            search = ?result.search_provider_ids,
            "Providers used"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "stratum",
            "Edge AI",
            "--llm",
            "openai-gpt4",
            "--search",
            "tavily",
            "--search",
            "exa",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.topic.as_deref(), Some("Edge AI"));
        assert_eq!(cli.llm.as_deref(), Some("openai-gpt4"));
        assert_eq!(cli.search, vec!["tavily", "exa"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parses_providers_subcommand() {
        let cli = Cli::try_parse_from(["stratum", "providers"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Providers)));
    }

    #[test]
    fn test_split_output_with_directory() {
        let (dir, name) = split_output(Path::new("out/reports/edge.md")).unwrap();
        assert_eq!(dir, Some(PathBuf::from("out/reports")));
        assert_eq!(name, "edge.md");
    }

    #[test]
    fn test_split_output_bare_name() {
        let (dir, name) = split_output(Path::new("edge.md")).unwrap();
        assert_eq!(dir, None);
        assert_eq!(name, "edge.md");
    }
}
