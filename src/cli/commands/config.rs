use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Show => {
            let config = Config::load()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                OutputFormat::Text => {
                    print!("{}", toml::to_string_pretty(&config)?);
                }
            }
        }

        ConfigCommand::Path => {
            let path =
                Config::config_path().context("could not determine config directory")?;
            println!("{}", path.display());
        }

        ConfigCommand::Init { force } => {
            let path =
                Config::config_path().context("could not determine config directory")?;
            if path.exists() && !force {
                anyhow::bail!(
                    "config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save()?;
            println!(
                "{}",
                formatter.format_message(&format!("Wrote default config to {}", path.display()))
            );
        }
    }

    Ok(())
}
