//! Source path normalisation and content hashing.
//!
//! Both feed the deduplication policy: a document is the same document when
//! its [`content_hash`] matches, and occupies the same slot when its
//! normalised path matches.

use sha2::{Digest, Sha256};

/// Normalise a source path lexically.
///
/// Backslashes become `/`, repeated separators collapse, `.` segments are
/// dropped and `..` pops the previous segment (never above the root of an
/// absolute path). No filesystem access happens here; callers that want
/// symlinks resolved canonicalise first.
pub fn normalize_source_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Normalise document text before hashing and chunking.
///
/// Converts `\r\n` and lone `\r` to `\n` so that the same content saved
/// with different line endings hashes identically.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// SHA-256 of the text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Final path component, used for name lookups.
pub fn file_name(source_path: &str) -> &str {
    source_path.rsplit('/').next().unwrap_or(source_path)
}
