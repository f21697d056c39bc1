//! Tree merge and the multi-step remote commit sequence.
//!
//! The sequence is a linear pipeline of fallible steps, each consuming the
//! previous step's output: ref -> commit -> tree -> create tree -> create
//! commit -> update ref. It short-circuits on the first failure; a failure
//! after objects were created leaves them orphaned and the ref unchanged.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::diff::GitOp;
use crate::remote::{BLOB_MODE, NewTreeEntry, RemoteError, RemoteStore, TreeEntry, TreeEntryKind};
use crate::repo::Repo;

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The fetched tree snapshot was incomplete; merging against it could
    /// silently resurrect or lose files, so the commit fails closed.
    #[error("Tree listing truncated; refusing to merge against a partial snapshot")]
    TruncatedTree,

    #[error("Commit failed at {step}: {source}")]
    Remote {
        step: &'static str,
        source: RemoteError,
    },
}

pub type Result<T> = std::result::Result<T, CommitError>;

fn at(step: &'static str) -> impl FnOnce(RemoteError) -> CommitError {
    move |source| CommitError::Remote { step, source }
}

/// Merge an op batch into a fetched tree snapshot, producing the entries
/// of the tree to submit.
///
/// Every old entry is kept unchanged unless an op targets it: write/delete
/// targets are dropped (the write re-supplies content), move sources keep
/// their blob sha under the new path. Subtree entries are dropped
/// unconditionally - the remote rebuilds directories from full blob paths,
/// and resubmitting them is known to keep deleted files alive. One new
/// blob entry is appended per write.
pub fn merge_tree(old: &[TreeEntry], ops: &[GitOp]) -> Vec<NewTreeEntry> {
    let mut writes: Vec<(&str, &str)> = Vec::new();
    let mut dropped: HashSet<&str> = HashSet::new();
    let mut moves: HashMap<&str, &str> = HashMap::new();

    for op in ops {
        match op {
            GitOp::Write { path, content } => {
                writes.push((path, content));
                dropped.insert(path);
            }
            GitOp::Delete { path } => {
                dropped.insert(path);
            }
            GitOp::Move { from, to } => {
                moves.insert(from.as_str(), to.as_str());
            }
        }
    }

    let mut merged = Vec::with_capacity(old.len() + writes.len());
    for entry in old {
        if entry.kind == TreeEntryKind::Tree {
            continue;
        }
        if dropped.contains(entry.path.as_str()) {
            continue;
        }
        let path = moves
            .get(entry.path.as_str())
            .map(|to| to.to_string())
            .unwrap_or_else(|| entry.path.clone());
        merged.push(NewTreeEntry {
            path,
            mode: entry.mode.clone(),
            kind: TreeEntryKind::Blob,
            sha: Some(entry.sha.clone()),
            content: None,
        });
    }

    for (path, content) in writes {
        merged.push(NewTreeEntry {
            path: path.to_string(),
            mode: BLOB_MODE.to_string(),
            kind: TreeEntryKind::Blob,
            sha: None,
            content: Some(content.to_string()),
        });
    }

    merged
}

/// Replay an op batch onto a repo's remote tree as a single commit.
///
/// Returns the new commit sha. The ref update is forced: the edit session
/// assumes it is the sole writer of this branch.
pub async fn commit<R: RemoteStore>(
    remote: &R,
    repo: &Repo,
    ops: &[GitOp],
    message: &str,
) -> Result<String> {
    debug!(repo = %repo, ops = ops.len(), "starting commit sequence");

    let head = remote
        .get_ref(repo, repo.branch())
        .await
        .map_err(at("get_ref"))?;
    let parent = remote
        .get_commit(repo, &head)
        .await
        .map_err(at("get_commit"))?;
    let tree = remote
        .get_tree(repo, &parent.tree_sha)
        .await
        .map_err(at("get_tree"))?;
    if tree.truncated {
        return Err(CommitError::TruncatedTree);
    }

    let merged = merge_tree(&tree.entries, ops);
    let new_tree = remote
        .create_tree(repo, &merged)
        .await
        .map_err(at("create_tree"))?;
    let new_commit = remote
        .create_commit(repo, message, &new_tree, &parent.sha)
        .await
        .map_err(at("create_commit"))?;
    remote
        .update_ref(repo, repo.branch(), &new_commit, true)
        .await
        .map_err(at("update_ref"))?;

    debug!(repo = %repo, commit = %new_commit, "commit sequence complete");
    Ok(new_commit)
}
