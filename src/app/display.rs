//! Run summary output

use colored::Colorize;
use queue_listener::queue::QueueStats;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub queue: String,
    pub remaining: usize,
    #[serde(flatten)]
    pub stats: QueueStats,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub elapsed_ms: u128,
    pub clean_shutdown: bool,
    pub containers: Vec<ContainerSummary>,
}

pub fn print_summary(summary: &RunSummary, format: &str) -> Result<(), serde_json::Error> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "{} in {} ms ({})",
        "Run finished".bold(),
        summary.elapsed_ms,
        if summary.clean_shutdown {
            "clean shutdown".green()
        } else {
            "work left in flight".yellow()
        }
    );
    for container in &summary.containers {
        let remaining = if container.remaining == 0 {
            container.remaining.to_string().green()
        } else {
            container.remaining.to_string().red()
        };
        println!(
            "  {:<12} sent {:>6}  received {:>6}  redelivered {:>5}  committed {:>6}  extended {:>5}  remaining {}",
            container.id.cyan(),
            container.stats.sent,
            container.stats.received,
            container.stats.redelivered,
            container.stats.committed,
            container.stats.lease_extensions,
            remaining
        );
    }
    Ok(())
}
