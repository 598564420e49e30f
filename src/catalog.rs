//! Catalog maintenance commands: `list`, `delete`, `check-duplicates`,
//! `toc`, and `reindex`.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};

use docshelf_core::toc::render_outline;

use crate::config::Config;
use crate::library::{self, short_id, DuplicateKind};
use crate::stats::format_ts_relative;

pub async fn run_list(config: &Config, detailed: bool) -> Result<()> {
    let library = library::open_library(config).await?;
    let documents = library.list().await?;

    if documents.is_empty() {
        println!("No documents.");
        library.store().close().await;
        return Ok(());
    }

    if detailed {
        for doc in &documents {
            let stored = library.get(&doc.id).await?;
            println!("{}", doc.title);
            println!("    id:       {}", doc.id);
            println!("    path:     {}", doc.source_path);
            println!("    type:     {}", doc.content_type);
            println!("    hash:     {}", doc.content_hash);
            println!("    chars:    {}", doc.char_count);
            println!(
                "    chunks:   {} parents, {} children",
                stored.parents.len(),
                stored.children.len()
            );
            println!("    toc:      {} entries", doc.toc.len());
            println!("    ingested: {}", format_ts_relative(doc.ingested_at));
            println!();
        }
    } else {
        println!("{:<10} {:<48} {}", "ID", "PATH", "TITLE");
        println!("{}", "-".repeat(80));
        for doc in &documents {
            println!(
                "{:<10} {:<48} {}",
                short_id(&doc.id),
                doc.source_path,
                doc.title
            );
        }
    }
    println!("{} document(s)", documents.len());

    library.store().close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, name: &str, force: bool) -> Result<()> {
    let library = library::open_library(config).await?;
    let document = library.resolve(name).await?;

    if !force {
        if !atty::is(atty::Stream::Stdin) {
            bail!(
                "Refusing to delete {} without confirmation; pass --force when stdin is not a terminal",
                document.source_path
            );
        }
        if !confirm(&format!(
            "Delete '{}' ({})? [y/N] ",
            document.source_path,
            short_id(&document.id)
        ))? {
            println!("Aborted.");
            library.store().close().await;
            return Ok(());
        }
    }

    let deleted = library.delete(&document.id).await?;
    println!("deleted {} ({})", deleted.source_path, deleted.id);

    library.store().close().await;
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub async fn run_check_duplicates(config: &Config, by_name: bool) -> Result<()> {
    let library = library::open_library(config).await?;
    let groups = library.duplicate_groups(by_name).await?;

    if groups.is_empty() {
        println!("No duplicates found.");
    }
    for group in &groups {
        match group.kind {
            DuplicateKind::ContentHash => println!(
                "content hash {} ({} documents)",
                &group.key[..group.key.len().min(12)],
                group.documents.len()
            ),
            DuplicateKind::FileName => println!(
                "file name {} ({} documents)",
                group.key,
                group.documents.len()
            ),
        }
        for doc in &group.documents {
            println!("  {}  {}", short_id(&doc.id), doc.source_path);
        }
    }

    library.store().close().await;
    Ok(())
}

pub async fn run_toc(config: &Config, name: &str, refresh: bool) -> Result<()> {
    let library = library::open_library(config).await?;
    let document = library.resolve(name).await?;

    let toc = if refresh {
        let (toc, tier) = library.refresh_toc(&document.id).await?;
        println!(
            "toc refreshed for {} (tier: {})",
            document.source_path,
            tier.as_deref().unwrap_or("none")
        );
        toc
    } else {
        document.toc
    };

    if toc.is_empty() {
        println!("(no table of contents)");
    } else {
        print!("{}", render_outline(&toc));
    }

    library.store().close().await;
    Ok(())
}

pub async fn run_reindex(config: &Config) -> Result<()> {
    let library = library::open_library(config).await?;
    let entries = library.reindex().await?;
    println!(
        "reindexed {} chunks with {}",
        entries,
        library.embedder().model_name()
    );
    library.store().close().await;
    Ok(())
}
