//! RemoteStore trait abstraction for the hosted tree-structured store.
//!
//! Implementations:
//! - `InMemoryRemote` - content-addressed reference implementation for tests
//! - an HTTP client in the application layer (out of scope here)
//!
//! The trait mirrors the remote's own primitives: recursive listing,
//! content fetch verified against an expected hash, and the ref / commit /
//! tree objects the commit sequence walks.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::repo::{Repo, RepoKey};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Content hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// One file as listed by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    /// Remote-assigned content identifier (opaque).
    pub content_hash: String,
    pub raw_url: Option<String>,
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryKind {
    Blob,
    Tree,
}

/// One entry of a fetched tree snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub sha: String,
}

/// A recursive tree snapshot.
///
/// `truncated` means the remote could not enumerate the whole tree; a
/// truncated snapshot must never be merged against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTree {
    pub sha: String,
    pub entries: Vec<TreeEntry>,
    pub truncated: bool,
}

/// A commit object, reduced to what the sequence needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommit {
    pub sha: String,
    pub tree_sha: String,
    pub parent: Option<String>,
}

/// One entry of a tree about to be created. Exactly one of `sha` (carry an
/// existing blob) or `content` (upload new bytes) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub sha: Option<String>,
    pub content: Option<String>,
}

/// Mode of a regular, non-executable blob.
pub const BLOB_MODE: &str = "100644";

/// The hosted store's primitives.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List every file under `path`, recursively.
    async fn list_files(&self, repo: &Repo, path: &str) -> Result<Vec<RemoteFile>>;

    /// Fetch one file's text, verified against the listed content hash.
    async fn fetch_content(&self, repo: &Repo, path: &str, expected_hash: &str) -> Result<String>;

    /// Resolve a branch ref to the commit it points at.
    async fn get_ref(&self, repo: &Repo, branch: &str) -> Result<String>;

    /// Fetch a commit object.
    async fn get_commit(&self, repo: &Repo, sha: &str) -> Result<RemoteCommit>;

    /// Fetch a full recursive tree snapshot.
    async fn get_tree(&self, repo: &Repo, tree_sha: &str) -> Result<RemoteTree>;

    /// Create a tree from full blob paths; subtree structure is implicit.
    async fn create_tree(&self, repo: &Repo, entries: &[NewTreeEntry]) -> Result<String>;

    /// Create a commit for a tree with one parent.
    async fn create_commit(
        &self,
        repo: &Repo,
        message: &str,
        tree_sha: &str,
        parent: &str,
    ) -> Result<String>;

    /// Point a branch ref at a commit.
    async fn update_ref(&self, repo: &Repo, branch: &str, sha: &str, force: bool) -> Result<()>;
}

// Implement RemoteStore for Arc<T> where T: RemoteStore
// This allows sharing one remote between sessions in tests
#[async_trait]
impl<T: RemoteStore + Send + Sync> RemoteStore for std::sync::Arc<T> {
    async fn list_files(&self, repo: &Repo, path: &str) -> Result<Vec<RemoteFile>> {
        (**self).list_files(repo, path).await
    }

    async fn fetch_content(&self, repo: &Repo, path: &str, expected_hash: &str) -> Result<String> {
        (**self).fetch_content(repo, path, expected_hash).await
    }

    async fn get_ref(&self, repo: &Repo, branch: &str) -> Result<String> {
        (**self).get_ref(repo, branch).await
    }

    async fn get_commit(&self, repo: &Repo, sha: &str) -> Result<RemoteCommit> {
        (**self).get_commit(repo, sha).await
    }

    async fn get_tree(&self, repo: &Repo, tree_sha: &str) -> Result<RemoteTree> {
        (**self).get_tree(repo, tree_sha).await
    }

    async fn create_tree(&self, repo: &Repo, entries: &[NewTreeEntry]) -> Result<String> {
        (**self).create_tree(repo, entries).await
    }

    async fn create_commit(
        &self,
        repo: &Repo,
        message: &str,
        tree_sha: &str,
        parent: &str,
    ) -> Result<String> {
        (**self).create_commit(repo, message, tree_sha, parent).await
    }

    async fn update_ref(&self, repo: &Repo, branch: &str, sha: &str, force: bool) -> Result<()> {
        (**self).update_ref(repo, branch, sha, force).await
    }
}

#[derive(Debug, Clone)]
struct StoredCommit {
    tree_sha: String,
    parent: Option<String>,
    #[allow(dead_code)]
    message: String,
}

#[derive(Debug, Default)]
struct RepoState {
    branches: HashMap<String, String>,
    commits: HashMap<String, StoredCommit>,
    trees: HashMap<String, Vec<TreeEntry>>,
    blobs: HashMap<String, String>,
    /// When set, get_tree reports the snapshot as truncated.
    truncated: bool,
    /// Paths whose content fetch fails with a transport error.
    failing_fetches: Vec<String>,
}

/// In-memory remote store for testing.
///
/// Content-addressed with SHA-256; tracks branches, commits, trees and
/// blobs per repo, and offers injection hooks for truncated trees and
/// failing fetches.
#[derive(Default)]
pub struct InMemoryRemote {
    repos: Mutex<HashMap<RepoKey, RepoState>>,
}

fn sha_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a repo with files, creating blobs, directory entries, the root
    /// tree, an initial commit and the branch ref. Returns the commit sha.
    pub fn seed_repo(&self, repo: &Repo, files: &[(&str, &str)]) -> String {
        let mut repos = self.repos.lock().unwrap();
        let state = repos.entry(repo.key()).or_default();

        let mut entries = Vec::new();
        let mut dirs: Vec<String> = Vec::new();
        for (path, content) in files {
            let sha = sha_of(content.as_bytes());
            state.blobs.insert(sha.clone(), content.to_string());
            entries.push(TreeEntry {
                path: path.to_string(),
                mode: BLOB_MODE.to_string(),
                kind: TreeEntryKind::Blob,
                sha,
            });
            // The remote lists intermediate directories as tree entries
            let parts: Vec<&str> = path.split('/').collect();
            let mut prefix = String::new();
            for part in &parts[..parts.len() - 1] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(part);
                if !dirs.contains(&prefix) {
                    dirs.push(prefix.clone());
                }
            }
        }
        for dir in dirs {
            let sha = sha_of(dir.as_bytes());
            entries.push(TreeEntry {
                path: dir,
                mode: "040000".to_string(),
                kind: TreeEntryKind::Tree,
                sha,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let tree_sha = Self::tree_sha(&entries);
        state.trees.insert(tree_sha.clone(), entries);

        let commit_sha = sha_of(format!("commit:{}:initial", tree_sha).as_bytes());
        state.commits.insert(
            commit_sha.clone(),
            StoredCommit {
                tree_sha,
                parent: None,
                message: "initial".to_string(),
            },
        );
        state
            .branches
            .insert(repo.branch().to_string(), commit_sha.clone());
        commit_sha
    }

    /// Make get_tree report a truncated snapshot for this repo.
    pub fn set_truncated(&self, repo: &Repo, truncated: bool) {
        let mut repos = self.repos.lock().unwrap();
        repos.entry(repo.key()).or_default().truncated = truncated;
    }

    /// Make fetch_content fail for one path of this repo.
    pub fn fail_fetch(&self, repo: &Repo, path: &str) {
        let mut repos = self.repos.lock().unwrap();
        repos
            .entry(repo.key())
            .or_default()
            .failing_fetches
            .push(path.to_string());
    }

    /// Number of trees ever created for a repo; lets tests assert the
    /// truncated-tree guard aborted before create_tree.
    pub fn tree_count(&self, repo: &Repo) -> usize {
        let repos = self.repos.lock().unwrap();
        repos.get(&repo.key()).map_or(0, |state| state.trees.len())
    }

    /// Materialize the blob contents reachable from a branch head.
    pub fn branch_contents(&self, repo: &Repo, branch: &str) -> HashMap<String, String> {
        let repos = self.repos.lock().unwrap();
        let mut contents = HashMap::new();
        let Some(state) = repos.get(&repo.key()) else {
            return contents;
        };
        let Some(commit_sha) = state.branches.get(branch) else {
            return contents;
        };
        let Some(commit) = state.commits.get(commit_sha) else {
            return contents;
        };
        if let Some(entries) = state.trees.get(&commit.tree_sha) {
            for entry in entries {
                if entry.kind == TreeEntryKind::Blob
                    && let Some(blob) = state.blobs.get(&entry.sha)
                {
                    contents.insert(entry.path.clone(), blob.clone());
                }
            }
        }
        contents
    }

    fn tree_sha(entries: &[TreeEntry]) -> String {
        let mut digest = String::new();
        for entry in entries {
            digest.push_str(&entry.path);
            digest.push('\0');
            digest.push_str(&entry.sha);
            digest.push('\0');
        }
        sha_of(digest.as_bytes())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn list_files(&self, repo: &Repo, path: &str) -> Result<Vec<RemoteFile>> {
        let repos = self.repos.lock().unwrap();
        let state = repos
            .get(&repo.key())
            .ok_or_else(|| RemoteError::NotFound(repo.to_string()))?;
        let commit_sha = state
            .branches
            .get(repo.branch())
            .ok_or_else(|| RemoteError::NotFound(format!("ref {}", repo.branch())))?;
        let commit = state
            .commits
            .get(commit_sha)
            .ok_or_else(|| RemoteError::NotFound(format!("commit {}", commit_sha)))?;
        let entries = state
            .trees
            .get(&commit.tree_sha)
            .ok_or_else(|| RemoteError::NotFound(format!("tree {}", commit.tree_sha)))?;

        let files = entries
            .iter()
            .filter(|entry| entry.kind == TreeEntryKind::Blob)
            .filter(|entry| path.is_empty() || entry.path.starts_with(&format!("{}/", path)))
            .map(|entry| RemoteFile {
                path: entry.path.clone(),
                content_hash: entry.sha.clone(),
                raw_url: Some(format!("mem://{}/{}", repo.key(), entry.path)),
            })
            .collect();
        Ok(files)
    }

    async fn fetch_content(&self, repo: &Repo, path: &str, expected_hash: &str) -> Result<String> {
        let repos = self.repos.lock().unwrap();
        let state = repos
            .get(&repo.key())
            .ok_or_else(|| RemoteError::NotFound(repo.to_string()))?;
        if state.failing_fetches.iter().any(|p| p == path) {
            return Err(RemoteError::Transport(format!("injected failure: {}", path)));
        }
        let content = state
            .blobs
            .get(expected_hash)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        let actual = sha_of(content.as_bytes());
        if actual != expected_hash {
            return Err(RemoteError::HashMismatch {
                path: path.to_string(),
                expected: expected_hash.to_string(),
                actual,
            });
        }
        Ok(content.clone())
    }

    async fn get_ref(&self, repo: &Repo, branch: &str) -> Result<String> {
        let repos = self.repos.lock().unwrap();
        repos
            .get(&repo.key())
            .and_then(|state| state.branches.get(branch))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("ref {}", branch)))
    }

    async fn get_commit(&self, repo: &Repo, sha: &str) -> Result<RemoteCommit> {
        let repos = self.repos.lock().unwrap();
        let commit = repos
            .get(&repo.key())
            .and_then(|state| state.commits.get(sha))
            .ok_or_else(|| RemoteError::NotFound(format!("commit {}", sha)))?;
        Ok(RemoteCommit {
            sha: sha.to_string(),
            tree_sha: commit.tree_sha.clone(),
            parent: commit.parent.clone(),
        })
    }

    async fn get_tree(&self, repo: &Repo, tree_sha: &str) -> Result<RemoteTree> {
        let repos = self.repos.lock().unwrap();
        let state = repos
            .get(&repo.key())
            .ok_or_else(|| RemoteError::NotFound(repo.to_string()))?;
        let entries = state
            .trees
            .get(tree_sha)
            .ok_or_else(|| RemoteError::NotFound(format!("tree {}", tree_sha)))?;
        Ok(RemoteTree {
            sha: tree_sha.to_string(),
            entries: entries.clone(),
            truncated: state.truncated,
        })
    }

    async fn create_tree(&self, repo: &Repo, new_entries: &[NewTreeEntry]) -> Result<String> {
        let mut repos = self.repos.lock().unwrap();
        let state = repos
            .get_mut(&repo.key())
            .ok_or_else(|| RemoteError::NotFound(repo.to_string()))?;

        let mut entries = Vec::with_capacity(new_entries.len());
        for new in new_entries {
            let sha = match (&new.sha, &new.content) {
                (Some(sha), None) => {
                    if !state.blobs.contains_key(sha) {
                        return Err(RemoteError::Protocol(format!("unknown blob {}", sha)));
                    }
                    sha.clone()
                }
                (None, Some(content)) => {
                    let sha = sha_of(content.as_bytes());
                    state.blobs.insert(sha.clone(), content.clone());
                    sha
                }
                _ => {
                    return Err(RemoteError::Protocol(format!(
                        "entry {} must carry exactly one of sha or content",
                        new.path
                    )));
                }
            };
            entries.push(TreeEntry {
                path: new.path.clone(),
                mode: new.mode.clone(),
                kind: new.kind,
                sha,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let tree_sha = Self::tree_sha(&entries);
        state.trees.insert(tree_sha.clone(), entries);
        Ok(tree_sha)
    }

    async fn create_commit(
        &self,
        repo: &Repo,
        message: &str,
        tree_sha: &str,
        parent: &str,
    ) -> Result<String> {
        let mut repos = self.repos.lock().unwrap();
        let state = repos
            .get_mut(&repo.key())
            .ok_or_else(|| RemoteError::NotFound(repo.to_string()))?;
        if !state.trees.contains_key(tree_sha) {
            return Err(RemoteError::Protocol(format!("unknown tree {}", tree_sha)));
        }

        let commit_sha = sha_of(format!("commit:{}:{}:{}", tree_sha, parent, message).as_bytes());
        state.commits.insert(
            commit_sha.clone(),
            StoredCommit {
                tree_sha: tree_sha.to_string(),
                parent: Some(parent.to_string()),
                message: message.to_string(),
            },
        );
        Ok(commit_sha)
    }

    async fn update_ref(&self, repo: &Repo, branch: &str, sha: &str, force: bool) -> Result<()> {
        let mut repos = self.repos.lock().unwrap();
        let state = repos
            .get_mut(&repo.key())
            .ok_or_else(|| RemoteError::NotFound(repo.to_string()))?;
        let commit = state
            .commits
            .get(sha)
            .ok_or_else(|| RemoteError::NotFound(format!("commit {}", sha)))?;

        if !force
            && let Some(current) = state.branches.get(branch)
            && commit.parent.as_deref() != Some(current.as_str())
        {
            return Err(RemoteError::Protocol(format!(
                "non-fast-forward update of {} requires force",
                branch
            )));
        }
        state.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repo {
        Repo::new("alice", "notes", "main", "token")
    }

    #[tokio::test]
    async fn test_seed_and_list() {
        let remote = InMemoryRemote::new();
        remote.seed_repo(&repo(), &[("a.md", "alpha"), ("docs/b.md", "beta")]);

        let files = remote.list_files(&repo(), "").await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "docs/b.md"]);
    }

    #[tokio::test]
    async fn test_list_subtree() {
        let remote = InMemoryRemote::new();
        remote.seed_repo(&repo(), &[("a.md", "alpha"), ("docs/b.md", "beta")]);

        let files = remote.list_files(&repo(), "docs").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "docs/b.md");
    }

    #[tokio::test]
    async fn test_fetch_content_verifies_hash() {
        let remote = InMemoryRemote::new();
        remote.seed_repo(&repo(), &[("a.md", "alpha")]);

        let files = remote.list_files(&repo(), "").await.unwrap();
        let content = remote
            .fetch_content(&repo(), "a.md", &files[0].content_hash)
            .await
            .unwrap();
        assert_eq!(content, "alpha");

        let err = remote
            .fetch_content(&repo(), "a.md", "deadbeef")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_fetch_failure() {
        let remote = InMemoryRemote::new();
        remote.seed_repo(&repo(), &[("a.md", "alpha")]);
        remote.fail_fetch(&repo(), "a.md");

        let files = remote.list_files(&repo(), "").await.unwrap();
        let err = remote
            .fetch_content(&repo(), "a.md", &files[0].content_hash)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }

    #[tokio::test]
    async fn test_seeded_tree_contains_directory_entries() {
        let remote = InMemoryRemote::new();
        remote.seed_repo(&repo(), &[("docs/deep/a.md", "alpha")]);

        let head = remote.get_ref(&repo(), "main").await.unwrap();
        let commit = remote.get_commit(&repo(), &head).await.unwrap();
        let tree = remote.get_tree(&repo(), &commit.tree_sha).await.unwrap();

        let dirs: Vec<&str> = tree
            .entries
            .iter()
            .filter(|e| e.kind == TreeEntryKind::Tree)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(dirs, vec!["docs", "docs/deep"]);
    }

    #[tokio::test]
    async fn test_update_ref_requires_force_for_non_fast_forward() {
        let remote = InMemoryRemote::new();
        let initial = remote.seed_repo(&repo(), &[("a.md", "alpha")]);

        let commit = remote.get_commit(&repo(), &initial).await.unwrap();
        // A commit whose parent is itself unrelated to the branch head
        let sha = remote
            .create_commit(&repo(), "orphan", &commit.tree_sha, "0000")
            .await
            .unwrap();

        let err = remote.update_ref(&repo(), "main", &sha, false).await.unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
        remote.update_ref(&repo(), "main", &sha, true).await.unwrap();
        assert_eq!(remote.get_ref(&repo(), "main").await.unwrap(), sha);
    }

    #[tokio::test]
    async fn test_truncated_flag_is_reported() {
        let remote = InMemoryRemote::new();
        let initial = remote.seed_repo(&repo(), &[("a.md", "alpha")]);
        remote.set_truncated(&repo(), true);

        let commit = remote.get_commit(&repo(), &initial).await.unwrap();
        let tree = remote.get_tree(&repo(), &commit.tree_sha).await.unwrap();
        assert!(tree.truncated);
    }
}
