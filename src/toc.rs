//! Table-of-contents extraction with a tiered fallback.
//!
//! | Tier | Source |
//! |------|--------|
//! | `outline` | Native PDF outline (bookmarks) via `lopdf` |
//! | `headings` | Markdown / numbered heading heuristic over the text |
//! | `model` | Chat model asked to outline the text (opt-in) |
//!
//! Each tier runs only when the previous one produced nothing. The result is
//! cached on the document and recomputed only on `toc --refresh`.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use docshelf_core::chain::{Tier, TierChain};
use docshelf_core::models::TocEntry;
use docshelf_core::toc::headings_from_text;

use crate::config::Config;
use crate::extract::MIME_PDF;
use crate::llm::{ChatClient, ChatModel};

/// Characters of document text sent to the model tier.
const MODEL_INPUT_CHARS: usize = 12_000;

/// What the tiers look at.
#[derive(Debug, Clone)]
pub struct TocSource {
    pub text: String,
    pub content_type: String,
    /// Original file bytes, when still available.
    pub raw: Option<Vec<u8>>,
}

pub type TocChain = TierChain<TocSource, Vec<TocEntry>>;

pub struct OutlineTier;

#[async_trait]
impl Tier<TocSource, Vec<TocEntry>> for OutlineTier {
    fn name(&self) -> &str {
        "outline"
    }

    async fn attempt(&self, input: &TocSource) -> Result<Option<Vec<TocEntry>>> {
        if input.content_type != MIME_PDF {
            return Ok(None);
        }
        let Some(raw) = input.raw.as_deref() else {
            return Ok(None);
        };
        let doc = lopdf::Document::load_mem(raw)?;
        // A PDF without /Outlines is an empty result, not a failure.
        let Ok(toc) = doc.get_toc() else {
            return Ok(None);
        };
        Ok(Some(
            toc.toc
                .into_iter()
                .map(|t| TocEntry {
                    level: t.level as u32,
                    title: t.title.trim().to_string(),
                    offset: None,
                    page: Some(t.page as u32),
                })
                .filter(|e| !e.title.is_empty())
                .collect(),
        ))
    }
}

pub struct HeadingTier;

#[async_trait]
impl Tier<TocSource, Vec<TocEntry>> for HeadingTier {
    fn name(&self) -> &str {
        "headings"
    }

    async fn attempt(&self, input: &TocSource) -> Result<Option<Vec<TocEntry>>> {
        Ok(Some(headings_from_text(&input.text)))
    }
}

pub struct ModelTier {
    model: Arc<dyn ChatModel>,
}

impl ModelTier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

const MODEL_SYSTEM_PROMPT: &str = "You extract a table of contents from a document. \
Reply with one section per line in the form `<level> | <title>`, where level 1 is a top-level \
section. Use the document's own wording. Reply with nothing else. If the document has no \
discernible sections, reply with an empty message.";

#[async_trait]
impl Tier<TocSource, Vec<TocEntry>> for ModelTier {
    fn name(&self) -> &str {
        "model"
    }

    async fn attempt(&self, input: &TocSource) -> Result<Option<Vec<TocEntry>>> {
        let excerpt: String = input.text.chars().take(MODEL_INPUT_CHARS).collect();
        if excerpt.trim().is_empty() {
            return Ok(None);
        }
        let reply = self.model.complete(MODEL_SYSTEM_PROMPT, &excerpt).await?;
        Ok(Some(parse_model_outline(&reply, &input.text)))
    }
}

/// Parse `<level> | <title>` lines. Offsets are filled in where the title
/// occurs verbatim in the text.
pub fn parse_model_outline(reply: &str, text: &str) -> Vec<TocEntry> {
    static LINE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(line_re) = LINE
        .get_or_init(|| Regex::new(r"^\s*[-*]?\s*([1-6])\s*\|\s*(.+?)\s*$").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    reply
        .lines()
        .filter_map(|line| line_re.captures(line))
        .filter_map(|caps| {
            let level: u32 = caps[1].parse().ok()?;
            let title = caps[2].to_string();
            let offset = text.find(&title).map(|byte| text[..byte].chars().count());
            Some(TocEntry {
                level,
                title,
                offset,
                page: None,
            })
        })
        .collect()
}

/// Build the tier chain from configuration.
pub fn build_chain(config: &Config) -> Result<TocChain> {
    let mut chain = TocChain::new()
        .push(Box::new(OutlineTier))
        .push(Box::new(HeadingTier));
    if config.toc.model_tier {
        let client: Arc<dyn ChatModel> = Arc::new(ChatClient::new(&config.llm)?);
        chain = chain.push(Box::new(ModelTier::new(client)));
    }
    Ok(chain)
}

/// Run the chain, treating "every tier failed or came back empty" as an
/// empty table of contents.
pub async fn extract(chain: &TocChain, source: &TocSource) -> (Vec<TocEntry>, Option<String>) {
    let outcome = chain.run(source).await;
    (outcome.value.unwrap_or_default(), outcome.tier)
}
