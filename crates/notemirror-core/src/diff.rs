//! Diff engine: turn the difference between an original and an edited file
//! map into a minimal batch of remote mutation ops.
//!
//! The diff is stateless - it is recomputed from the current (original,
//! edit) pair on every staging action and carries no history. Ops for
//! unrelated paths are independent; the emitted order is deterministic
//! (sorted paths) purely so batches are reproducible.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::file_map::{FileMap, FileState, MultiRepoFileMap};
use crate::repo::RepoKey;

/// One intended mutation against a repo's remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitOp {
    Write { path: String, content: String },
    Delete { path: String },
    Move { from: String, to: String },
}

impl GitOp {
    /// The path this op introduces or rewrites, if any.
    pub fn target_path(&self) -> Option<&str> {
        match self {
            GitOp::Write { path, .. } => Some(path),
            GitOp::Move { to, .. } => Some(to),
            GitOp::Delete { .. } => None,
        }
    }
}

/// Compute the op batch for one repo.
///
/// A path whose content differs or is newly present becomes a `Write`; a
/// path present only in the original becomes a `Delete`; a `Delete` paired
/// with a *purely added* `Write` of byte-identical content collapses into
/// a single `Move` so unchanged blob content is never re-uploaded.
pub fn diff_file_map(original: &FileMap, edit: &FileMap) -> Vec<GitOp> {
    struct Addition {
        path: String,
        content: String,
        /// Newly present in the edit map (a rename candidate), as opposed
        /// to changed content under an existing path.
        is_new: bool,
        consumed: bool,
    }

    let mut additions: Vec<Addition> = Vec::new();
    for path in edit.sorted_paths() {
        let Some(FileState::Fetched(content)) = edit.get(path).map(|f| &f.state) else {
            continue;
        };
        match original.get(path) {
            Some(before) => {
                if before.state != FileState::Fetched(content.clone()) {
                    additions.push(Addition {
                        path: path.clone(),
                        content: content.clone(),
                        is_new: false,
                        consumed: false,
                    });
                }
            }
            None => additions.push(Addition {
                path: path.clone(),
                content: content.clone(),
                is_new: true,
                consumed: false,
            }),
        }
    }

    let mut ops: Vec<GitOp> = Vec::new();
    let mut deletions: Vec<String> = Vec::new();

    for path in original.sorted_paths() {
        if edit.contains(path) {
            continue;
        }
        // Deletion + identical pure addition = rename. Byte identity is
        // the only signal the remote gives us before upload.
        let mut moved_to = None;
        if let Some(before) = original.get(path)
            && let Some(content) = before.content()
            && let Some(addition) = additions
                .iter_mut()
                .find(|add| add.is_new && !add.consumed && add.content == content)
        {
            addition.consumed = true;
            moved_to = Some(addition.path.clone());
        }
        match moved_to {
            Some(to) => ops.push(GitOp::Move {
                from: path.clone(),
                to,
            }),
            None => deletions.push(path.clone()),
        }
    }

    for addition in additions.into_iter().filter(|add| !add.consumed) {
        ops.push(GitOp::Write {
            path: addition.path,
            content: addition.content,
        });
    }
    for path in deletions {
        ops.push(GitOp::Delete { path });
    }

    ops
}

/// Compute per-repo op batches across every loaded repository.
///
/// Repos with no pending changes are omitted.
pub fn diff_file_maps(
    original: &MultiRepoFileMap,
    edit: &MultiRepoFileMap,
) -> HashMap<RepoKey, Vec<GitOp>> {
    let empty = FileMap::new();
    let mut batches = HashMap::new();

    let mut keys: Vec<&RepoKey> = original.sorted_keys();
    for key in edit.sorted_keys() {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    for key in keys {
        let before = original.get(key).unwrap_or(&empty);
        let after = edit.get(key).unwrap_or(&empty);
        let ops = diff_file_map(before, after);
        if !ops.is_empty() {
            debug!(repo = %key, ops = ops.len(), "pending mutations");
            batches.insert(key.clone(), ops);
        }
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(files: &[(&str, &str)]) -> FileMap {
        let mut map = FileMap::new();
        for (path, content) in files {
            map.set_content(path, content.to_string());
        }
        map
    }

    #[test]
    fn test_no_changes_no_ops() {
        let original = map_with(&[("a.md", "x")]);
        let edit = original.clone();
        assert!(diff_file_map(&original, &edit).is_empty());
    }

    #[test]
    fn test_changed_content_is_write() {
        let original = map_with(&[("a.md", "x")]);
        let edit = map_with(&[("a.md", "y")]);
        assert_eq!(
            diff_file_map(&original, &edit),
            vec![GitOp::Write {
                path: "a.md".to_string(),
                content: "y".to_string()
            }]
        );
    }

    #[test]
    fn test_removed_key_is_delete() {
        let original = map_with(&[("a.md", "x")]);
        let edit = FileMap::new();
        assert_eq!(
            diff_file_map(&original, &edit),
            vec![GitOp::Delete {
                path: "a.md".to_string()
            }]
        );
    }

    #[test]
    fn test_rename_collapses_to_move() {
        let original = map_with(&[("a.md", "x"), ("b.md", "y")]);
        let edit = map_with(&[("a.md", "x"), ("c.md", "y")]);
        assert_eq!(
            diff_file_map(&original, &edit),
            vec![GitOp::Move {
                from: "b.md".to_string(),
                to: "c.md".to_string()
            }]
        );
    }

    #[test]
    fn test_changed_path_is_not_a_move_target() {
        // b.md is deleted; a.md changed to b's old content. The write is
        // not a pure addition, so no rename is inferred.
        let original = map_with(&[("a.md", "x"), ("b.md", "y")]);
        let edit = map_with(&[("a.md", "y")]);
        let ops = diff_file_map(&original, &edit);
        assert_eq!(
            ops,
            vec![
                GitOp::Write {
                    path: "a.md".to_string(),
                    content: "y".to_string()
                },
                GitOp::Delete {
                    path: "b.md".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_each_addition_consumed_once() {
        // Two deletions, one identical addition: one move, one delete.
        let original = map_with(&[("a.md", "same"), ("b.md", "same")]);
        let edit = map_with(&[("c.md", "same")]);
        let ops = diff_file_map(&original, &edit);
        assert_eq!(
            ops,
            vec![
                GitOp::Move {
                    from: "a.md".to_string(),
                    to: "c.md".to_string()
                },
                GitOp::Delete {
                    path: "b.md".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_unfetched_files_never_diff() {
        use crate::file_map::File;

        let mut original = FileMap::new();
        original.insert(File {
            path: "big.bin".to_string(),
            content_hash: "h".to_string(),
            raw_url: None,
            state: FileState::NotFetched,
        });
        let edit = original.clone();
        assert!(diff_file_map(&original, &edit).is_empty());
    }

    #[test]
    fn test_fetch_failed_is_not_a_delete() {
        let original = map_with(&[("a.md", "x")]);
        let mut edit = original.clone();
        edit.set_fetch_failed("a.md", "flaky".to_string());
        // The path still exists in the edit map: no delete, and no write
        // (there is no content to write).
        assert!(diff_file_map(&original, &edit).is_empty());
    }

    #[test]
    fn test_batches_are_repo_scoped() {
        let key_a = RepoKey::new("alice", "one");
        let key_b = RepoKey::new("alice", "two");

        let mut original = MultiRepoFileMap::new();
        original.insert(key_a.clone(), map_with(&[("a.md", "x")]));
        original.insert(key_b.clone(), map_with(&[("b.md", "y")]));

        let mut edit = original.clone();
        edit.get_mut(&key_a)
            .unwrap()
            .set_content("a.md", "changed".to_string());

        let batches = diff_file_maps(&original, &edit);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[&key_a].len(), 1);
        assert!(!batches.contains_key(&key_b));
    }
}
