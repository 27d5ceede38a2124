use anyhow::Result;
use console::style;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat, VectorDriver};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let client = DaemonClient::new(&config);

    // The daemon owns the store backend, so connectivity and document counts
    // come from its status report; with no daemon we fall back to the
    // configured values and mark the store unknown.
    let status = if client.is_running() {
        match client.status().await {
            Ok(remote) => StatusInfo {
                daemon_running: true,
                daemon_idle_secs: Some(remote.idle_secs),
                embedding_model: remote.embedding_model,
                model_ready: remote.model_ready,
                store_driver: remote.store.driver,
                store_url: remote.store.url,
                store_connected: remote.store.connected,
                store_points: remote.store.points_count,
                collection: remote.store.collection,
                metrics: remote.metrics,
            },
            Err(_) => offline_status(&config),
        }
    } else {
        offline_status(&config)
    };

    print!("{}", formatter.format_status(&status));

    if format == OutputFormat::Text && (!status.daemon_running || !status.store_connected) {
        eprintln!();
        if !status.daemon_running {
            eprintln!(
                "{}",
                style("Hint: daemon not running. It will start automatically on first add/search.")
                    .dim()
            );
            eprintln!("{}", style("      Or start manually with: docdex serve").dim());
        }
        if status.daemon_running && !status.store_connected {
            let hint = match config.vector_store.driver {
                VectorDriver::Qdrant => {
                    "Warning: Qdrant not reachable. Start with: docker compose up -d qdrant"
                }
                VectorDriver::PostgreSQL => {
                    "Warning: PostgreSQL not reachable. Check connection settings."
                }
            };
            eprintln!("{}", style(hint).yellow());
        }
    }

    Ok(())
}

fn offline_status(config: &Config) -> StatusInfo {
    StatusInfo {
        daemon_running: false,
        daemon_idle_secs: None,
        embedding_model: config.embedding.model_id.clone(),
        model_ready: false,
        store_driver: config.vector_store.driver.to_string(),
        store_url: config.vector_store.url.clone(),
        store_connected: false,
        store_points: 0,
        collection: config.vector_store.collection.clone(),
        metrics: None,
    }
}
