//! Structured storage references and filename sanitization.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TOKEN_LEN: usize = 32;
const MAX_STEM_CHARS: usize = 120;
const FALLBACK_STEM: &str = "upload";

static PATH_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[/\\]+").expect("valid separator regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
static UNSAFE_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("valid unsafe char regex"));

/// Reference to one stored blob: a random token plus the sanitized original name.
///
/// Persisted as `<token>_<file_name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    token: String,
    file_name: String,
}

impl ArtifactRef {
    /// Creates a reference with a fresh v4 token for `original_name`.
    pub fn generate(original_name: &str) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            file_name: sanitize_file_name(original_name),
        }
    }

    /// Parses a persisted storage name.
    ///
    /// Returns `None` when the token part is malformed or the name part is
    /// empty or not already sanitized.
    pub fn parse(storage_name: &str) -> Option<Self> {
        let (token, file_name) = storage_name.split_once('_')?;
        let token_ok = token.len() == TOKEN_LEN
            && token
                .chars()
                .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch));
        if !token_ok || file_name.is_empty() || sanitize_file_name(file_name) != file_name {
            return None;
        }
        Some(Self {
            token: token.to_string(),
            file_name: file_name.to_string(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Display name delivered to downloading clients.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Opaque on-disk name.
    pub fn storage_name(&self) -> String {
        format!("{}_{}", self.token, self.file_name)
    }
}

impl Display for ArtifactRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.token, self.file_name)
    }
}

impl Serialize for ArtifactRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lowercased extension after the last `.`, if any.
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Reduces a client-supplied filename to a safe single path segment.
///
/// Path separators become `_`, characters outside `[A-Za-z0-9_.-]` are
/// dropped, and leading/trailing `.`/`_` are trimmed. The lowercased extension
/// is kept; an empty stem falls back to `upload`.
pub fn sanitize_file_name(original_name: &str) -> String {
    let (stem, ext) = match original_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (original_name, None),
    };

    let stem = clean_segment(stem);
    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        let capped: String = stem.chars().take(MAX_STEM_CHARS).collect();
        // Re-trim so the stored name stays a fixed point of sanitization.
        capped.trim_end_matches(['.', '_']).to_string()
    };

    match ext.map(clean_segment).filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{stem}.{}", ext.to_ascii_lowercase()),
        None => stem,
    }
}

fn clean_segment(value: &str) -> String {
    let separated = PATH_SEPARATOR_RE.replace_all(value, " ");
    let joined = WHITESPACE_RE.replace_all(separated.trim(), "_");
    let safe = UNSAFE_CHARS_RE.replace_all(&joined, "");
    safe.trim_matches(|ch| ch == '.' || ch == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::{file_extension, sanitize_file_name, ArtifactRef};

    #[test]
    fn sanitize_strips_separators_and_unsafe_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd.pdf"), "etc_passwd.pdf");
        assert_eq!(sanitize_file_name("my thesis (v2).DOCX"), "my_thesis_v2.docx");
        assert_eq!(sanitize_file_name("C:\\docs\\plan.doc"), "C_docs_plan.doc");
    }

    #[test]
    fn sanitize_falls_back_when_stem_is_empty() {
        assert_eq!(sanitize_file_name("任务书.pdf"), "upload.pdf");
        assert_eq!(sanitize_file_name("..."), "upload");
    }

    #[test]
    fn storage_name_keeps_underscores_in_display_name() {
        let artifact = ArtifactRef::generate("final_task_book.pdf");
        let parsed = ArtifactRef::parse(&artifact.storage_name()).expect("generated name parses");
        assert_eq!(parsed, artifact);
        assert_eq!(parsed.file_name(), "final_task_book.pdf");
        assert!(!parsed.token().contains('_'));
    }

    #[test]
    fn parse_rejects_names_without_token() {
        assert!(ArtifactRef::parse("plan.pdf").is_none());
        assert!(ArtifactRef::parse("abc_plan.pdf").is_none());
        assert!(ArtifactRef::parse(&format!("{}_", "a".repeat(32))).is_none());
        assert!(ArtifactRef::parse(&format!("{}_../x.pdf", "a".repeat(32))).is_none());
    }

    #[test]
    fn generated_tokens_are_unique_for_identical_names() {
        let first = ArtifactRef::generate("a.pdf");
        let second = ArtifactRef::generate("a.pdf");
        assert_ne!(first.storage_name(), second.storage_name());
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(file_extension("Plan.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }
}
