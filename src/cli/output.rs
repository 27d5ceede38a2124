use std::fmt::Write as FmtWrite;

use crate::models::{OutputFormat, SearchResults};
use crate::services::MetricsSummary;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_add_stats(&self, stats: &AddStats) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub daemon_running: bool,
    pub daemon_idle_secs: Option<u64>,
    pub embedding_model: String,
    pub model_ready: bool,
    pub store_driver: String,
    pub store_url: String,
    pub store_connected: bool,
    pub store_points: u64,
    pub collection: String,
    pub metrics: Option<MetricsSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct AddStats {
    pub submitted: u64,
    pub added: u64,
    pub duration_ms: u64,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(output, "Found {} results\n", results.len()).unwrap();

        for (i, hit) in results.results.iter().enumerate() {
            writeln!(output, "{}. [score: {:.4}]", i + 1, hit.score).unwrap();
            writeln!(output, "   Id: {}", hit.id).unwrap();

            let preview: String = hit.document.chars().take(200).collect();
            let preview = if hit.document.chars().count() > 200 {
                format!("{}...", preview)
            } else {
                preview
            };
            for line in preview.lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let daemon_status = if status.daemon_running {
            "[RUNNING]"
        } else {
            "[STOPPED]"
        };
        writeln!(output, "Daemon:        {}", daemon_status).unwrap();

        if status.daemon_running {
            let model_state = if status.model_ready {
                "ready"
            } else {
                "loading"
            };
            writeln!(
                output,
                "  Embedding:   {} ({})",
                status.embedding_model, model_state
            )
            .unwrap();
            if let Some(idle) = status.daemon_idle_secs {
                writeln!(output, "  Idle:        {}s", idle).unwrap();
            }
            if let Some(ref m) = status.metrics {
                writeln!(output, "  Requests:    {}", m.total_requests).unwrap();
                writeln!(output, "  Avg Latency: {}ms", m.avg_latency_ms).unwrap();
                if m.error_rate > 0.0 {
                    writeln!(output, "  Error Rate:  {:.1}%", m.error_rate).unwrap();
                }
            }
        }
        writeln!(output).unwrap();

        let store_status = if status.store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} ({})",
            status.store_driver, store_status
        )
        .unwrap();
        writeln!(output, "  URL:         {}", status.store_url).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.store_connected {
            writeln!(output, "  Documents:   {}", status.store_points).unwrap();
        }

        output
    }

    fn format_add_stats(&self, stats: &AddStats) -> String {
        let mut output = String::new();
        writeln!(output, "Added {} of {} documents", stats.added, stats.submitted).unwrap();
        writeln!(output, "Duration: {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap()
        } else {
            serde_json::to_string(value).unwrap()
        }
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        let value = serde_json::to_value(results)
            .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}));
        self.render(&value)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let metrics = status.metrics.as_ref().map(|m| {
            serde_json::json!({
                "total_requests": m.total_requests,
                "avg_latency_ms": m.avg_latency_ms,
                "error_rate": m.error_rate,
            })
        });

        let json = serde_json::json!({
            "daemon": {
                "running": status.daemon_running,
                "idle_secs": status.daemon_idle_secs,
                "embedding_model": status.embedding_model,
                "model_ready": status.model_ready,
                "metrics": metrics,
            },
            "vector_store": {
                "driver": status.store_driver,
                "url": status.store_url,
                "connected": status.store_connected,
                "collection": status.collection,
                "documents": status.store_points,
            }
        });

        self.render(&json)
    }

    fn format_add_stats(&self, stats: &AddStats) -> String {
        let json = serde_json::json!({
            "success": true,
            "submitted": stats.submitted,
            "added": stats.added,
            "duration_ms": stats.duration_ms,
        });
        self.render(&json)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchHit;

    #[test]
    fn test_text_search_results_show_rank_and_score() {
        let results = SearchResults::new(
            "cat".to_string(),
            vec![SearchHit {
                id: "abc".to_string(),
                document: "cat".to_string(),
                score: 0.0,
            }],
        );
        let text = TextFormatter.format_search_results(&results);
        assert!(text.contains("1. [score: 0.0000]"));
        assert!(text.contains("Id: abc"));
    }

    #[test]
    fn test_json_add_stats_carry_added_count() {
        let stats = AddStats {
            submitted: 2,
            added: 2,
            duration_ms: 5,
        };
        let json = JsonFormatter::new(false).format_add_stats(&stats);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["added"], 2);
        assert_eq!(value["success"], true);
    }
}
