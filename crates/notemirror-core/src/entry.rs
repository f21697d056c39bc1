//! Entries: the logical units of the user-facing index.
//!
//! Every reconciliation pass rebuilds the entry list from scratch, but an
//! entry's `key` is stable for as long as its underlying source (repo +
//! path for file entries, target for links) is unchanged, so selection and
//! focus survive a pass. `idx` is the position in the canonical sort order
//! and is recomputed every pass - it carries no identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repo::RepoKey;

/// A lookup that must succeed failed; indicates a logic defect upstream,
/// not a data problem.
#[derive(Debug, Error)]
#[error("entry {key:?} missing after reconciliation; this is a bug")]
pub struct InvariantError {
    pub key: String,
}

/// Payload of a note entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteContent {
    pub repo: RepoKey,
    /// Directory part of the path; empty at the repository root.
    pub location: String,
    pub extension: String,
    pub time_created: DateTime<Utc>,
    pub time_updated: DateTime<Utc>,
    pub markdown: String,
    pub html: String,
    /// Outgoing link targets extracted from the text.
    pub link_targets: Vec<String>,
}

/// Payload of a document entry. Content stays on the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub repo: RepoKey,
    pub location: String,
    pub extension: String,
    pub time_created: DateTime<Utc>,
    pub time_updated: DateTime<Utc>,
    pub raw_url: Option<String>,
}

/// Payload of a link entry: a snapshot of the arena record at the end of a
/// reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkContent {
    /// The linked target string; globally unique within the link graph.
    pub target: String,
    /// Entry keys of the notes referencing this link.
    pub backrefs: Vec<String>,
    pub repos: Vec<RepoKey>,
    pub locations: Vec<String>,
    /// Explicitly created by the user; persists with zero references.
    pub standalone: bool,
    /// The link's own labels, independent of inherited ones.
    pub own_labels: Vec<String>,
}

/// Tagged entry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryContent {
    Note(NoteContent),
    Document(DocumentContent),
    Link(LinkContent),
}

impl EntryContent {
    /// Rank used by the canonical sort: Note < Document < Link.
    pub fn rank(&self) -> u8 {
        match self {
            EntryContent::Note(_) => 0,
            EntryContent::Document(_) => 1,
            EntryContent::Link(_) => 2,
        }
    }
}

/// One logical unit in the user-facing index.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub title: String,
    /// Content-kind rank; drives the canonical sort.
    pub priority: u8,
    pub labels: Vec<String>,
    pub content: EntryContent,
    /// Stable identity: `{repoKey}:{path}` for file entries, the target
    /// string for links.
    pub key: String,
    /// Position in the canonical sort order; ephemeral.
    pub idx: usize,
}

impl Entry {
    pub fn new(title: String, labels: Vec<String>, content: EntryContent, key: String) -> Self {
        let priority = content.rank();
        Self {
            title,
            priority,
            labels,
            content,
            key,
            idx: 0,
        }
    }

    /// Key of a file-backed entry.
    pub fn file_key(repo: &RepoKey, path: &str) -> String {
        format!("{}:{}", repo, path)
    }
}

/// Apply the canonical ordering and assign `idx`.
///
/// Stable sort by (kind rank, case-insensitive title), so entries that
/// compare equal keep their emission order.
pub fn sort_and_index(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.idx = idx;
    }
}

/// Locate an entry by key after a pass.
///
/// Callers use this for entries they know must exist (e.g. the one just
/// modified); a miss is an internal invariant violation, not a data error.
pub fn position_of(entries: &[Entry], key: &str) -> Result<usize, InvariantError> {
    entries
        .iter()
        .position(|entry| entry.key == key)
        .ok_or_else(|| InvariantError {
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn note(title: &str) -> Entry {
        let repo = RepoKey::new("alice", "notes");
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let key = Entry::file_key(&repo, &format!("{}.md", title));
        Entry::new(
            title.to_string(),
            vec![],
            EntryContent::Note(NoteContent {
                repo,
                location: String::new(),
                extension: "md".to_string(),
                time_created: time,
                time_updated: time,
                markdown: String::new(),
                html: String::new(),
                link_targets: vec![],
            }),
            key,
        )
    }

    fn document(title: &str) -> Entry {
        let repo = RepoKey::new("alice", "notes");
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let key = Entry::file_key(&repo, title);
        Entry::new(
            title.to_string(),
            vec![],
            EntryContent::Document(DocumentContent {
                repo,
                location: String::new(),
                extension: String::new(),
                time_created: time,
                time_updated: time,
                raw_url: None,
            }),
            key,
        )
    }

    fn link(target: &str) -> Entry {
        Entry::new(
            target.to_string(),
            vec![],
            EntryContent::Link(LinkContent {
                target: target.to_string(),
                backrefs: vec![],
                repos: vec![],
                locations: vec![],
                standalone: false,
                own_labels: vec![],
            }),
            target.to_string(),
        )
    }

    #[test]
    fn test_canonical_sort_order() {
        let mut entries = vec![link("z"), note("B"), document("a"), note("A")];
        sort_and_index(&mut entries);

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "a", "z"]);
        assert!(matches!(entries[0].content, EntryContent::Note(_)));
        assert!(matches!(entries[1].content, EntryContent::Note(_)));
        assert!(matches!(entries[2].content, EntryContent::Document(_)));
        assert!(matches!(entries[3].content, EntryContent::Link(_)));
    }

    #[test]
    fn test_sort_assigns_idx_by_position() {
        let mut entries = vec![note("b"), note("a")];
        sort_and_index(&mut entries);
        assert_eq!(entries[0].idx, 0);
        assert_eq!(entries[1].idx, 1);
        assert_eq!(entries[0].title, "a");
    }

    #[test]
    fn test_title_comparison_is_case_insensitive() {
        let mut entries = vec![note("banana"), note("Apple")];
        sort_and_index(&mut entries);
        assert_eq!(entries[0].title, "Apple");
    }

    #[test]
    fn test_position_of_found() {
        let mut entries = vec![note("a"), note("b")];
        sort_and_index(&mut entries);
        let key = entries[1].key.clone();
        assert_eq!(position_of(&entries, &key).unwrap(), 1);
    }

    #[test]
    fn test_position_of_missing_is_invariant_error() {
        let entries = vec![note("a")];
        let err = position_of(&entries, "alice/notes:ghost.md").unwrap_err();
        assert!(err.to_string().contains("ghost.md"));
    }
}
