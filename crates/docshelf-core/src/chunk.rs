//! Two-level boundary-aware chunker.
//!
//! Splits a document into coarse [`ParentChunk`]s (retrieval context) and
//! fine [`ChildChunk`]s (vector search units). Both levels use the same
//! procedure, so a parent is to its children what the document is to its
//! parents.
//!
//! # Algorithm
//!
//! For a span of `len` characters and a target size `t`:
//!
//! 1. If `len <= t`, the span is a single piece.
//! 2. Otherwise pick `n = ceil(len / t)` pieces; boundary `i` aims at
//!    `len * i / n`.
//! 3. Each boundary may move within a tolerance window around its aim:
//!    `max(slack / 2n, t / 20)` where `slack = n * t - len`. This keeps
//!    every piece under `1.1 * t` and the piece count exactly `n`.
//! 4. Inside the window the best boundary wins, by preference: after a
//!    blank line or before a heading line, after a newline, after a sentence
//!    end, between words. Ties go to the candidate closest to the aim. With
//!    no candidate the cut is hard, at the aim.
//!
//! Pieces partition the span exactly: concatenating parents reproduces the
//! document, concatenating a parent's children reproduces the parent.
//!
//! A document no longer than the parent target yields exactly one parent
//! and one child.
//!
//! # Example
//!
//! ```rust
//! use docshelf_core::chunk::{split_document, ChunkParams};
//!
//! let (parents, children) =
//!     split_document("doc-1", "Hello world.\n\nSecond paragraph.", &ChunkParams::default()).unwrap();
//! assert_eq!(parents.len(), 1);
//! assert_eq!(children.len(), 1);
//! assert_eq!(parents[0].text, children[0].text);
//! ```

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ChildChunk, ParentChunk};
use crate::path::content_hash;

/// Default parent target size in characters.
pub const DEFAULT_PARENT_CHARS: usize = 2000;
/// Default child target size in characters.
pub const DEFAULT_CHILD_CHARS: usize = 400;

/// Target sizes for both chunk levels, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub parent_chars: usize,
    pub child_chars: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            parent_chars: DEFAULT_PARENT_CHARS,
            child_chars: DEFAULT_CHILD_CHARS,
        }
    }
}

/// Split a document into parents and children.
///
/// Returns parents in document order and children in (parent, child)
/// order. Every child's `parent_id` names a parent in the returned list and
/// its text is a contiguous substring of that parent's text.
///
/// # Errors
///
/// - [`Error::Chunking`] when `text` is empty or whitespace only.
/// - [`Error::InvalidArgument`] when a target size is zero.
pub fn split_document(
    document_id: &str,
    text: &str,
    params: &ChunkParams,
) -> Result<(Vec<ParentChunk>, Vec<ChildChunk>)> {
    if text.trim().is_empty() {
        return Err(Error::Chunking(format!(
            "document {} has no text to chunk",
            document_id
        )));
    }
    if params.parent_chars == 0 || params.child_chars == 0 {
        return Err(Error::invalid("chunk target sizes must be > 0"));
    }

    let doc = CharText::new(text);
    let whole_doc_fits = doc.len() <= params.parent_chars;
    let parent_spans = split_spans(&doc, params.parent_chars);

    let mut parents = Vec::with_capacity(parent_spans.len());
    let mut children = Vec::new();

    for (p_index, &(p_start, p_end)) in parent_spans.iter().enumerate() {
        let parent = ParentChunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            index: p_index,
            text: doc.slice(p_start, p_end).to_string(),
            start: p_start,
            end: p_end,
        };

        let parent_text = CharText::new(&parent.text);
        let child_spans = if whole_doc_fits {
            vec![(0, parent_text.len())]
        } else {
            split_spans(&parent_text, params.child_chars)
        };

        for (c_index, &(c_start, c_end)) in child_spans.iter().enumerate() {
            let child_text = parent_text.slice(c_start, c_end);
            children.push(ChildChunk {
                id: Uuid::new_v4().to_string(),
                parent_id: parent.id.clone(),
                document_id: document_id.to_string(),
                index: c_index,
                text: child_text.to_string(),
                start: p_start + c_start,
                end: p_start + c_end,
                hash: content_hash(child_text),
            });
        }

        parents.push(parent);
    }

    tracing::debug!(
        document_id,
        parents = parents.len(),
        children = children.len(),
        "split document"
    );

    Ok((parents, children))
}

/// Text with a char-index → byte-offset table, so spans can be computed in
/// characters and sliced in bytes.
struct CharText<'a> {
    text: &'a str,
    chars: Vec<char>,
    byte_at: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut byte_at = Vec::with_capacity(text.len() + 1);
        for (offset, ch) in text.char_indices() {
            byte_at.push(offset);
            chars.push(ch);
        }
        byte_at.push(text.len());
        Self {
            text,
            chars,
            byte_at,
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.byte_at[start]..self.byte_at[end]]
    }

    fn at(&self, i: usize) -> char {
        self.chars[i]
    }
}

/// Boundary preference, lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BoundaryKind {
    Section,
    Line,
    Sentence,
    Word,
}

/// Classify a cut placed before character `p` (`0 < p < len`).
fn classify(text: &CharText<'_>, p: usize) -> Option<BoundaryKind> {
    let prev = text.at(p - 1);
    let next = text.at(p);

    if prev == '\n' {
        if next == '\n' {
            // Mid-run of blank lines: cut after the run instead.
            return None;
        }
        let blank_line = p >= 2 && text.at(p - 2) == '\n';
        if blank_line || next == '#' {
            return Some(BoundaryKind::Section);
        }
        return Some(BoundaryKind::Line);
    }

    if prev.is_whitespace() && !next.is_whitespace() {
        if p >= 2 && matches!(text.at(p - 2), '.' | '!' | '?' | ';' | ':') {
            return Some(BoundaryKind::Sentence);
        }
        return Some(BoundaryKind::Word);
    }

    None
}

/// Split `text` into spans of roughly `target` characters.
fn split_spans(text: &CharText<'_>, target: usize) -> Vec<(usize, usize)> {
    let len = text.len();
    if len <= target {
        return vec![(0, len)];
    }

    let n = len.div_ceil(target);
    let slack = n * target - len;
    let tolerance = (slack / (2 * n)).max(target / 20).max(1);

    let mut spans = Vec::with_capacity(n);
    let mut start = 0;

    for i in 1..n {
        let aim = len * i / n;
        let lo = aim.saturating_sub(tolerance).max(start + 1);
        let hi = (aim + tolerance).min(len - 1);

        let mut best: Option<(BoundaryKind, usize, usize)> = None;
        for p in lo..=hi {
            if let Some(kind) = classify(text, p) {
                let distance = p.abs_diff(aim);
                let better = match best {
                    None => true,
                    Some((b_kind, b_dist, _)) => (kind, distance) < (b_kind, b_dist),
                };
                if better {
                    best = Some((kind, distance, p));
                }
            }
        }

        let cut = best.map(|(_, _, p)| p).unwrap_or(aim.max(start + 1));
        spans.push((start, cut));
        start = cut;
    }
    spans.push((start, len));

    spans
}
