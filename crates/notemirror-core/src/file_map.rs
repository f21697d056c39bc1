//! File maps: the authoritative per-repo snapshot of tracked remote paths.
//!
//! A `FileMap` holds what is known about every tracked path of one
//! repository. It performs no I/O itself; the load layer populates it from
//! the remote, and user actions mutate the forked edit copy. Cloning a map
//! is the fork: the copy shares nothing with its source.

use std::collections::HashMap;

use crate::repo::RepoKey;

/// Fetch state of one tracked file. Exactly one of the three applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Content was fetched and decoded.
    Fetched(String),
    /// The remote read failed; the file still exists and must never be
    /// treated as deleted or empty.
    FetchFailed(String),
    /// The file exists but its content is intentionally not fetched
    /// (opaque documents are tracked by hash only).
    NotFetched,
}

impl FileState {
    /// The fetched text, if this file has any.
    pub fn content(&self) -> Option<&str> {
        match self {
            FileState::Fetched(text) => Some(text),
            FileState::FetchFailed(_) | FileState::NotFetched => None,
        }
    }

    pub fn is_fetch_failed(&self) -> bool {
        matches!(self, FileState::FetchFailed(_))
    }
}

/// One tracked path within a repo's file map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Path relative to the repository root.
    pub path: String,
    /// Remote-assigned content identifier (opaque).
    pub content_hash: String,
    /// Direct-fetch locator, when the remote provides one.
    pub raw_url: Option<String>,
    /// Fetch state of the content.
    pub state: FileState,
}

impl File {
    pub fn content(&self) -> Option<&str> {
        self.state.content()
    }
}

/// Mapping from path to file state, scoped to one repository.
#[derive(Debug, Clone, Default)]
pub struct FileMap {
    files: HashMap<String, File>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&File> {
        self.files.get(path)
    }

    /// Insert a file as listed by the remote, without content.
    pub fn insert(&mut self, file: File) {
        self.files.insert(file.path.clone(), file);
    }

    /// Upsert content for a path, clearing any prior fetch error.
    ///
    /// New paths get an empty content hash; the remote assigns one on the
    /// next commit.
    pub fn set_content(&mut self, path: &str, content: String) {
        match self.files.get_mut(path) {
            Some(file) => file.state = FileState::Fetched(content),
            None => {
                self.files.insert(
                    path.to_string(),
                    File {
                        path: path.to_string(),
                        content_hash: String::new(),
                        raw_url: None,
                        state: FileState::Fetched(content),
                    },
                );
            }
        }
    }

    /// Record a failed content fetch for a path the remote listed.
    pub fn set_fetch_failed(&mut self, path: &str, message: String) {
        if let Some(file) = self.files.get_mut(path) {
            file.state = FileState::FetchFailed(message);
        }
    }

    /// Remove a path entirely. Distinct from setting empty content: the
    /// next diff sees a removed key as a deletion.
    pub fn remove(&mut self, path: &str) -> Option<File> {
        self.files.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &File)> {
        self.files.iter()
    }

    /// Paths in sorted order, for deterministic walks.
    pub fn sorted_paths(&self) -> Vec<&String> {
        let mut paths: Vec<&String> = self.files.keys().collect();
        paths.sort();
        paths
    }
}

/// File maps for every configured repository.
#[derive(Debug, Clone, Default)]
pub struct MultiRepoFileMap {
    repos: HashMap<RepoKey, FileMap>,
}

impl MultiRepoFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RepoKey, map: FileMap) {
        self.repos.insert(key, map);
    }

    pub fn get(&self, key: &RepoKey) -> Option<&FileMap> {
        self.repos.get(key)
    }

    pub fn get_mut(&mut self, key: &RepoKey) -> Option<&mut FileMap> {
        self.repos.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RepoKey, &FileMap)> {
        self.repos.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RepoKey, &mut FileMap)> {
        self.repos.iter_mut()
    }

    /// Repo keys in sorted order, for deterministic walks.
    pub fn sorted_keys(&self) -> Vec<&RepoKey> {
        let mut keys: Vec<&RepoKey> = self.repos.keys().collect();
        keys.sort();
        keys
    }
}
