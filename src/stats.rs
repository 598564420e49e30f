//! `docshelf stats`: library size and index coverage.

use anyhow::Result;

use crate::config::Config;
use crate::library;

pub async fn run_stats(config: &Config) -> Result<()> {
    let library = library::open_library(config).await?;
    let stats = library.stats().await?;
    let last_ingest = library
        .list()
        .await?
        .iter()
        .map(|d| d.ingested_at)
        .max();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docshelf — Library Stats");
    println!("========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!("  Embedder:      {}", library.embedder().model_name());
    println!();
    println!("  Documents:     {}", stats.documents);
    println!("  Parent chunks: {}", stats.parents);
    println!("  Child chunks:  {}", stats.children);
    println!(
        "  Indexed:       {} / {} ({}%)",
        stats.index_entries,
        stats.children,
        if stats.children > 0 {
            (stats.index_entries * 100) / stats.children
        } else {
            0
        }
    );
    println!(
        "  Last ingest:   {}",
        last_ingest
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();

    library.store().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub(crate) fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_short(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_short(ts)
    }
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
