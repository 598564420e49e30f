//! Heading heuristic for tables of contents.
//!
//! Recognises, outside fenced code blocks:
//!
//! * ATX headings: `# Title` through `###### Title`
//! * setext headings: a line underlined with `===` (level 1) or `---`
//!   (level 2)
//! * numbered section headings: `1 Introduction`, `2.3 Results`, used only
//!   when the text has no markdown headings, since markdown lists would
//!   otherwise match
//!
//! Offsets are character offsets of the heading line.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::TocEntry;

const MAX_TITLE_CHARS: usize = 120;

struct Patterns {
    atx: Regex,
    setext_1: Regex,
    setext_2: Regex,
    numbered: Regex,
    fence: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                atx: Regex::new(r"^ {0,3}(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").ok()?,
                setext_1: Regex::new(r"^ {0,3}=+[ \t]*$").ok()?,
                setext_2: Regex::new(r"^ {0,3}-{2,}[ \t]*$").ok()?,
                numbered: Regex::new(r"^(\d{1,2}(?:\.\d{1,2}){0,3})\.?[ \t]+(\p{Lu}[^\n]*)$").ok()?,
                fence: Regex::new(r"^ {0,3}(```|~~~)").ok()?,
            })
        })
        .as_ref()
}

/// Extract a table of contents from plain or markdown text.
pub fn headings_from_text(text: &str) -> Vec<TocEntry> {
    let Some(p) = patterns() else {
        return Vec::new();
    };

    let mut markdown = Vec::new();
    let mut numbered = Vec::new();
    let mut in_fence = false;
    let mut offset = 0usize;
    // (line, offset) of the previous line, if it could be a setext title
    let mut prev: Option<(&str, usize)> = None;

    for line in text.split('\n') {
        let line_offset = offset;
        offset += line.chars().count() + 1;
        let line = line.trim_end_matches('\r');

        if p.fence.is_match(line) {
            in_fence = !in_fence;
            prev = None;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = p.atx.captures(line) {
            let title = caps[2].trim().to_string();
            if !title.is_empty() {
                markdown.push(entry(caps[1].len() as u32, title, line_offset));
            }
            prev = None;
            continue;
        }

        if let Some((title, title_offset)) = prev {
            let level = if p.setext_1.is_match(line) {
                Some(1)
            } else if p.setext_2.is_match(line) {
                Some(2)
            } else {
                None
            };
            if let Some(level) = level {
                markdown.push(entry(level, title.trim().to_string(), title_offset));
                prev = None;
                continue;
            }
        }

        if let Some(caps) = p.numbered.captures(line.trim()) {
            let title = caps[2].trim();
            let looks_like_sentence = title.ends_with('.') || title.ends_with(',');
            if !looks_like_sentence && title.chars().count() <= MAX_TITLE_CHARS {
                let level = caps[1].split('.').count() as u32;
                numbered.push(entry(level, format!("{} {}", &caps[1], title), line_offset));
            }
        }

        prev = if is_setext_candidate(line) {
            Some((line, line_offset))
        } else {
            None
        };
    }

    if markdown.is_empty() {
        numbered
    } else {
        markdown
    }
}

fn is_setext_candidate(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_TITLE_CHARS
        && !trimmed.starts_with(['-', '*', '+', '>', '|'])
        && !line.starts_with("    ")
}

fn entry(level: u32, title: String, offset: usize) -> TocEntry {
    TocEntry {
        level,
        title,
        offset: Some(offset),
        page: None,
    }
}

/// Render entries as an indented outline, one per line.
pub fn render_outline(entries: &[TocEntry]) -> String {
    let min_level = entries.iter().map(|e| e.level).min().unwrap_or(1);
    let mut out = String::new();
    for e in entries {
        let indent = "  ".repeat(e.level.saturating_sub(min_level) as usize);
        out.push_str(&indent);
        out.push_str(&e.title);
        if let Some(page) = e.page {
            out.push_str(&format!(" (p. {})", page));
        }
        out.push('\n');
    }
    out
}
