//! Scrapeflow CLI - command line client for the daemon's JSON-RPC surface

mod rpc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Deserialize;
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "scrapeflow")]
#[command(about = "Scrapeflow CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "SCRAPEFLOW_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Trigger {
    Manual,
    Api,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Manual => "MANUAL",
            Trigger::Api => "API",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue an execution of a job definition
    Enqueue {
        /// Job definition ID
        job_definition_id: String,

        #[arg(short, long, value_enum, default_value = "manual")]
        trigger: Trigger,
    },

    /// Show one execution
    Get {
        execution_id: String,
    },

    /// Cancel a queued execution
    Cancel {
        execution_id: String,
    },

    /// Show the last log entries of an execution
    Logs {
        execution_id: String,

        /// Number of entries to tail
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Show queue and execution counters
    Status,

    /// Change the global concurrency cap
    Concurrency {
        max: usize,
    },
}

#[derive(Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct EnqueueRow {
    execution_id: String,
    status: String,
}

#[derive(Tabled)]
struct ExecutionRow {
    id: String,
    job: String,
    trigger: String,
    status: String,
    created: String,
    finished: String,
    items: String,
}

fn format_millis(value: &Value) -> String {
    value
        .as_i64()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn execution_row(e: &Value) -> ExecutionRow {
    let text = |key: &str| e[key].as_str().unwrap_or("-").to_string();
    let items = match (&e["metrics"]["items_saved"], &e["metrics"]["items_found"]) {
        (Value::Number(saved), Value::Number(found)) => format!("{}/{}", saved, found),
        _ => "-".to_string(),
    };
    ExecutionRow {
        id: text("id"),
        job: text("job_definition_id"),
        trigger: text("trigger_type"),
        status: text("status"),
        created: format_millis(&e["created_at"]),
        finished: format_millis(&e["finished_at"]),
        items,
    }
}

fn colored_level(level: &str) -> colored::ColoredString {
    match level {
        "ERROR" => level.red().bold(),
        "WARN" => level.yellow(),
        "DEBUG" => level.dimmed(),
        _ => level.normal(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let url = cli.rpc_url.as_str();

    match cli.command {
        Commands::Enqueue {
            job_definition_id,
            trigger,
        } => {
            let params = json!({
                "jobDefinitionId": job_definition_id,
                "triggerType": trigger.as_str(),
            });
            let result = rpc::call(url, "executions.enqueue.v1", params).await?;
            let row: EnqueueRow = serde_json::from_value(result)?;

            println!("{}", "✓ Execution enqueued".green().bold());
            println!();
            println!("{}", Table::new(vec![row]));
        }

        Commands::Get { execution_id } => {
            let result =
                rpc::call(url, "executions.get.v1", json!({ "executionId": execution_id })).await?;
            let execution = &result["execution"];
            println!("{}", Table::new(vec![execution_row(execution)]));
            if let Some(message) = execution["error_message"].as_str() {
                println!();
                println!("  {} {}", "Error:".red().bold(), message);
            }
        }

        Commands::Cancel { execution_id } => {
            rpc::call(url, "executions.cancel.v1", json!({ "executionId": execution_id })).await?;
            println!("{}", format!("✓ Execution {} cancelled", execution_id).green().bold());
        }

        Commands::Logs {
            execution_id,
            lines,
        } => {
            let params = json!({ "executionId": execution_id, "lines": lines });
            let result = rpc::call(url, "logs.tail.v1", params).await?;
            let entries = result["entries"].as_array().cloned().unwrap_or_default();
            if entries.is_empty() {
                println!("{}", "No logs available".yellow());
            }
            for entry in entries {
                println!(
                    "{} [{}] {}",
                    format_millis(&entry["timestamp"]).dimmed(),
                    colored_level(entry["level"].as_str().unwrap_or("INFO")),
                    entry["message"].as_str().unwrap_or_default()
                );
            }
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match rpc::call(url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    let queue = &stats["queue"];
                    println!("  {} {}", "RPC URL:".bold(), url);
                    let state = if queue["accepting"].as_bool().unwrap_or(false) {
                        "ONLINE".green()
                    } else {
                        "SHUTTING DOWN".yellow()
                    };
                    println!("  {} {}", "Status:".bold(), state);
                    println!();
                    println!(
                        "  {} {}/{}",
                        "Active:".bold(),
                        queue["active"],
                        queue["maxConcurrency"]
                    );
                    println!("  {} {}", "In queue:".bold(), queue["queued"]);
                    println!();
                    println!("  {} {}", "Queued:".bold(), stats["queuedExecutions"]);
                    println!("  {} {}", "Running:".bold(), stats["runningExecutions"]);
                    println!("  {} {}", "Completed:".bold(), stats["completedExecutions"]);
                    println!("  {} {}", "Failed:".bold(), stats["failedExecutions"]);
                    println!("  {} {}", "Cancelled:".bold(), stats["cancelledExecutions"]);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptimeSeconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Concurrency { max } => {
            let result =
                rpc::call(url, "admin.concurrency.v1", json!({ "maxConcurrency": max })).await?;
            println!(
                "{}",
                format!("✓ Max concurrency set to {}", result["maxConcurrency"])
                    .green()
                    .bold()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_row_from_record_json() {
        let record = json!({
            "id": "e-1",
            "job_definition_id": "job-1",
            "trigger_type": "SCHEDULED",
            "status": "COMPLETED",
            "created_at": 0,
            "finished_at": null,
            "metrics": { "items_found": 5, "items_saved": 4, "items_failed": 1, "errors": [] }
        });
        let row = execution_row(&record);
        assert_eq!(row.status, "COMPLETED");
        assert_eq!(row.created, "1970-01-01 00:00:00");
        assert_eq!(row.finished, "-");
        assert_eq!(row.items, "4/5");
    }
}
