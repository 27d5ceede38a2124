use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let client = DaemonClient::new(&config);
    let results = client.search(query).await.context("search failed")?;

    if verbose {
        eprintln!(
            "Found {} results in {}ms",
            results.len(),
            start_time.elapsed().as_millis()
        );
        eprintln!();
    }

    print!("{}", formatter.format_search_results(&results));

    Ok(())
}
