//! Add command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cli::output::{AddStats, get_formatter};
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Document texts to index. When omitted, documents are read from --file
    /// or stdin.
    pub text: Vec<String>,

    /// Path to a JSON array or JSONL file of documents (use - for stdin)
    #[arg(long, short = 'F')]
    pub file: Option<PathBuf>,
}

pub async fn handle_add(args: AddArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let mut documents = args.text;
    if documents.is_empty() {
        let input = read_input(args.file.as_deref())?;
        documents = parse_document_lines(&input)?;
    }

    if verbose {
        eprintln!("Submitting {} documents", documents.len());
    }

    let spinner = if format == OutputFormat::Text && documents.len() > 1 {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(format!("Indexing {} documents...", documents.len()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let client = DaemonClient::new(&config);
    let submitted = documents.len() as u64;
    let response = client
        .add_documents(serde_json::Value::from(documents))
        .await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let response = match response {
        Ok(r) => r,
        Err(e) if e.is_validation() => anyhow::bail!("invalid request: {}", e),
        Err(e) => return Err(anyhow::Error::new(e).context("failed to add documents")),
    };

    let stats = AddStats {
        submitted,
        added: response.added,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_add_stats(&stats));

    Ok(())
}

/// Read input from file or stdin.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path.to_string_lossy() != "-" => {
            std::fs::read_to_string(path).context("failed to read file")
        }
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            Ok(input)
        }
    }
}

/// Parse documents from a JSON array of strings or JSONL (one JSON string or
/// raw text line per line).
fn parse_document_lines(input: &str) -> Result<Vec<String>> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(Vec::new());
    }

    if input.starts_with('[') {
        return serde_json::from_str(input).context("failed to parse JSON array");
    }

    let documents = input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<String>(line).unwrap_or_else(|_| line.to_string()))
        .collect();

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let docs = parse_document_lines(r#"["cat", "dog"]"#).unwrap();
        assert_eq!(docs, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_parse_jsonl_strings() {
        let docs = parse_document_lines("\"cat\"\n\"dog\"").unwrap();
        assert_eq!(docs, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_parse_raw_lines() {
        let docs = parse_document_lines("first document\n\nsecond document\n").unwrap();
        assert_eq!(
            docs,
            vec!["first document".to_string(), "second document".to_string()]
        );
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_document_lines("  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_array_is_rejected() {
        assert!(parse_document_lines(r#"["cat", 42]"#).is_err());
    }
}
