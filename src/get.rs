//! `docshelf get-source`: raw chunk dump for one document.

use anyhow::{Context, Result};

use docshelf_core::models::StoredDocument;

use crate::config::Config;
use crate::library;

pub async fn run_get_source(config: &Config, name: &str, json: bool) -> Result<()> {
    let library = library::open_library(config).await?;
    let document = library.resolve(name).await?;
    let stored = library
        .get(&document.id)
        .await
        .with_context(|| format!("Failed to load document {}", document.id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        print_source(&stored);
    }

    library.store().close().await;
    Ok(())
}

fn print_source(stored: &StoredDocument) {
    let doc = &stored.document;
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    println!("source_path:  {}", doc.source_path);
    println!("content_type: {}", doc.content_type);
    println!("content_hash: {}", doc.content_hash);
    println!("ingested_at:  {}", format_ts_iso(doc.ingested_at));
    println!("chars:        {}", doc.char_count);
    println!("toc entries:  {}", doc.toc.len());
    println!();

    println!(
        "--- Chunks ({} parents, {} children) ---",
        stored.parents.len(),
        stored.children.len()
    );
    for parent in &stored.parents {
        println!(
            "[parent {}] chars {}-{} id={}",
            parent.index, parent.start, parent.end, parent.id
        );
        println!("{}", parent.text);
        println!();
        for child in stored.children_of(&parent.id) {
            println!(
                "  [child {}.{}] chars {}-{} id={}",
                parent.index, child.index, child.start, child.end, child.id
            );
            println!("  {}", child.text.replace('\n', "\n  "));
            println!();
        }
    }
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
