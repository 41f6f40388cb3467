//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use std::path::Path;
use stratum_core::config::load_config;
use stratum_core::providers::{Availability, ProviderEntry, ProviderRegistry};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace).await,
        Commands::Providers => handle_providers(workspace),
    }
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".stratum");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = stratum_core::StratumConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn handle_providers(workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let registry = ProviderRegistry::from_config(&config);

    print!("{}", format_entries("LLM providers", &registry.llm_options()));
    println!();
    print!("{}", format_entries("Search providers", &registry.search_options()));
    Ok(())
}

/// Render a provider listing, one line per entry.
///
/// Defaults are starred; unavailable entries carry their reason.
pub(crate) fn format_entries(title: &str, entries: &[ProviderEntry]) -> String {
    let mut out = format!("{title} ({}):\n", entries.len());
    for entry in entries {
        let marker = if entry.is_default { '*' } else { ' ' };
        let status = match &entry.availability {
            Availability::Available => "available".to_string(),
            Availability::Unavailable { reason } => format!("unavailable: {reason}"),
        };
        out.push_str(&format!(
            "  {marker} {:<22} {:<28} {status}\n",
            entry.id, entry.display_name
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).await.unwrap();

        let config_path = workspace.join(".stratum").join("config.toml");
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: stratum_core::StratumConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, stratum_core::StratumConfig::default());
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_path = workspace.join(".stratum").join("config.toml");

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).await.unwrap();
        std::fs::write(&config_path, "[writer]\nsection_pause_ms = 5\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).await.unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(content, "[writer]\nsection_pause_ms = 5\n");
    }

    #[test]
    fn test_format_entries_marks_defaults_and_reasons() {
        let entries = vec![
            ProviderEntry {
                id: "tavily".to_string(),
                display_name: "Tavily".to_string(),
                description: String::new(),
                is_default: true,
                availability: Availability::Available,
            },
            ProviderEntry {
                id: "exa".to_string(),
                display_name: "Exa".to_string(),
                description: String::new(),
                is_default: false,
                availability: Availability::Unavailable {
                    reason: "EXA_API_KEY is not set".to_string(),
                },
            },
        ];

        let text = format_entries("Search providers", &entries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Search providers (2):");
        assert!(lines[1].starts_with("  * tavily"));
        assert!(lines[1].ends_with("available"));
        assert!(lines[2].starts_with("    exa"));
        assert!(lines[2].ends_with("unavailable: EXA_API_KEY is not set"));
    }

    #[test]
    fn test_format_entries_empty() {
        assert_eq!(format_entries("LLM providers", &[]), "LLM providers (0):\n");
    }
}
