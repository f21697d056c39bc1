//! Load orchestration: populate file maps from the remote and derive the
//! initial entry set.
//!
//! Repos are independent, so their loads run fully in parallel; within one
//! repo the per-file content fetches fan out concurrently and the map is
//! only observable once every fetch settled. Data errors never abort a
//! load - they are accumulated and reported in aggregate.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use notepath::{ContentKind, classify};

use crate::entry::Entry;
use crate::file_map::{File, FileMap, FileState, MultiRepoFileMap};
use crate::links::LinkArena;
use crate::metadata::{REGISTRY_PATH, is_reserved_path, parse_registry};
use crate::reconcile::reconcile_all;
use crate::remote::RemoteStore;
use crate::render::MarkdownRenderer;
use crate::repo::{Repo, RepoKey};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to fetch {repo}:{path}: {message}")]
    Fetch {
        repo: RepoKey,
        path: String,
        message: String,
    },

    #[error("Metadata for {repo}:{path} could not be fetched; entry excluded")]
    SidecarUnavailable { repo: RepoKey, path: String },

    #[error("Failed to list {repo}: {message}")]
    List { repo: RepoKey, message: String },
}

/// Everything a fresh load produces.
pub struct LoadOutcome {
    /// Canonically sorted and indexed entries.
    pub entries: Vec<Entry>,
    /// Link arena backing the link entries; lives for the edit session.
    pub links: LinkArena,
    /// Maps as fetched; replaced wholesale on the next load.
    pub original: MultiRepoFileMap,
    /// Fork of `original` carrying staged sidecars/registries and all
    /// subsequent user edits.
    pub edit: MultiRepoFileMap,
    /// Aggregated data errors; the load itself always completes.
    pub errors: Vec<LoadError>,
}

/// Whether a listed path's content is fetched eagerly.
///
/// Notes need their text for rendering; reserved paths are YAML the engine
/// parses. Documents stay on the remote, and bookmark placeholders encode
/// everything in their filename.
fn should_fetch(path: &str) -> bool {
    if is_reserved_path(path) {
        return true;
    }
    classify(path) == ContentKind::Note
}

/// Fetch one repo into a file map.
async fn load_repo_map<R: RemoteStore>(remote: &R, repo: &Repo) -> (FileMap, Vec<LoadError>) {
    let mut map = FileMap::new();
    let mut errors = Vec::new();

    let listed = match remote.list_files(repo, "").await {
        Ok(listed) => listed,
        Err(err) => {
            errors.push(LoadError::List {
                repo: repo.key(),
                message: err.to_string(),
            });
            return (map, errors);
        }
    };

    for file in &listed {
        map.insert(File {
            path: file.path.clone(),
            content_hash: file.content_hash.clone(),
            raw_url: file.raw_url.clone(),
            state: FileState::NotFetched,
        });
    }

    let fetches = listed
        .iter()
        .filter(|file| should_fetch(&file.path))
        .map(|file| async move {
            let result = remote
                .fetch_content(repo, &file.path, &file.content_hash)
                .await;
            (file.path.clone(), result)
        });
    for (path, result) in join_all(fetches).await {
        match result {
            Ok(content) => map.set_content(&path, content),
            Err(err) => map.set_fetch_failed(&path, err.to_string()),
        }
    }

    (map, errors)
}

/// Load every configured repo and derive the entry set.
pub async fn load_entries<R: RemoteStore>(
    remote: &R,
    renderer: &dyn MarkdownRenderer,
    repos: &[Repo],
    now: DateTime<Utc>,
) -> LoadOutcome {
    let loads = repos
        .iter()
        .map(|repo| async move { (repo.key(), load_repo_map(remote, repo).await) });

    let mut original = MultiRepoFileMap::new();
    let mut errors = Vec::new();
    for (key, (map, repo_errors)) in join_all(loads).await {
        original.insert(key, map);
        errors.extend(repo_errors);
    }

    // Seed the arena from each repo's persisted registry
    let mut arena = LinkArena::new();
    let keys: Vec<RepoKey> = original.sorted_keys().into_iter().cloned().collect();
    for key in keys {
        let Some(map) = original.get(&key) else { continue };
        match map.get(REGISTRY_PATH).map(|file| &file.state) {
            Some(FileState::Fetched(text)) => match parse_registry(text) {
                Some(records) => {
                    for record in records {
                        arena.seed_registry_record(record, &key);
                    }
                }
                None => warn!(repo = %key, "malformed link registry; starting empty"),
            },
            Some(FileState::FetchFailed(message)) => errors.push(LoadError::Fetch {
                repo: key.clone(),
                path: REGISTRY_PATH.to_string(),
                message: message.clone(),
            }),
            Some(FileState::NotFetched) | None => {}
        }
    }

    let mut edit = original.clone();
    let outcome = reconcile_all(&mut edit, &mut arena, renderer, now);
    errors.extend(outcome.errors);

    info!(
        repos = repos.len(),
        entries = outcome.entries.len(),
        errors = errors.len(),
        "load complete"
    );

    LoadOutcome {
        entries: outcome.entries,
        links: arena,
        original,
        edit,
        errors,
    }
}
