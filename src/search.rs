//! `docshelf search`: local retrieval with optional web fallback.

use anyhow::{Context, Result};
use std::sync::Arc;

use docshelf_core::models::{HitSource, RetrievalHit};
use docshelf_core::retrieve::Retriever;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::fallback::{Answer, FallbackController};

/// Characters of context shown per hit.
const EXCERPT_CHARS: usize = 240;

pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub local_only: bool,
    pub json: bool,
}

pub async fn run_search(config: &Config, query: &str, opts: &SearchOptions) -> Result<()> {
    let top_k = opts.top_k.unwrap_or(config.retrieval.top_k);

    let store = Arc::new(db::open_store(config).await?);
    let embedder = embedding::create_provider(&config.embedding)?;
    let retriever =
        Retriever::new(Arc::clone(&store), embedder).with_overfetch(config.retrieval.overfetch);

    let controller = if opts.local_only {
        FallbackController::local_only(retriever)
    } else {
        FallbackController::from_config(retriever, config)?
    };

    let answer = controller
        .answer(query, top_k)
        .await
        .with_context(|| format!("Search failed for query '{}'", query))?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }

    store.close().await;
    Ok(())
}

fn print_answer(answer: &Answer) {
    if answer.hits.is_empty() {
        println!("No results.");
    }
    for (i, hit) in answer.hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    if !answer.complete {
        println!("note: web fallback unavailable; results may be incomplete");
    }
}

fn print_hit(rank: usize, hit: &RetrievalHit) {
    match &hit.source {
        HitSource::Local { parent, document } => {
            println!(
                "{}. [{:.2}] {} / {}",
                rank, hit.score, document.source_path, document.title
            );
            println!(
                "    parent: #{} (chars {}-{})",
                parent.index, parent.start, parent.end
            );
            println!("    excerpt: \"{}\"", excerpt(&parent.text));
            println!("    id: {}", document.id);
        }
        HitSource::External {
            title,
            url,
            snippet,
            provider,
        } => {
            println!("{}. [web] {} / {}", rank, provider, title);
            println!("    url: {}", url);
            println!("    excerpt: \"{}\"", excerpt(snippet));
        }
    }
    println!();
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}
