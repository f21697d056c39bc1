//! Reconciliation engine: derive the canonical entry set from file maps,
//! the link arena, and metadata sidecars.
//!
//! A pass never hard-fails. Malformed inputs degrade - an unparseable
//! sidecar is replaced by synthesized metadata staged for the next commit,
//! an unfetchable one excludes its entry and is reported - and everything
//! degraded is logged. Link state is reset and rebuilt in place inside the
//! arena so link identity (the target key) survives the pass.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use notepath::{ContentKind, classify, filename_to_title, split_location_and_filename};

use crate::entry::{DocumentContent, Entry, EntryContent, NoteContent, sort_and_index};
use crate::file_map::{FileMap, FileState, MultiRepoFileMap};
use crate::links::LinkArena;
use crate::load::LoadError;
use crate::metadata::{
    MetaData, REGISTRY_PATH, is_reserved_path, normalize_labels, serialize_registry, sidecar_path,
};
use crate::render::MarkdownRenderer;
use crate::repo::RepoKey;

/// Result of extracting one repo's file entries.
pub struct RepoExtraction {
    /// Derived Note and Document entries.
    pub entries: Vec<Entry>,
    /// Link targets decoded from bookmark placeholder files.
    pub placeholder_targets: Vec<String>,
    /// Paths excluded from derivation, with the reason.
    pub errors: Vec<LoadError>,
}

/// Result of a full reconciliation pass.
pub struct ReconcileOutcome {
    /// Canonically sorted and indexed entries.
    pub entries: Vec<Entry>,
    /// Accumulated data-quality errors; never aborts the pass.
    pub errors: Vec<LoadError>,
}

/// Extract Note/Document entries from one repo's file map.
///
/// Sidecar resolution per tracked path:
/// 1. sidecar parses - build the entry from it
/// 2. sidecar exists but its content is unavailable - exclude the path and
///    report it (an unfetchable sidecar is never overwritten)
/// 3. sidecar absent or unparseable - synthesize fresh metadata and stage
///    the sidecar into the map so the next commit persists it
pub fn extract_file_entries(
    repo: &RepoKey,
    map: &mut FileMap,
    renderer: &dyn MarkdownRenderer,
    now: DateTime<Utc>,
) -> RepoExtraction {
    let mut entries = Vec::new();
    let mut placeholder_targets = Vec::new();
    let mut errors = Vec::new();
    let mut staged: Vec<(String, String)> = Vec::new();

    let paths: Vec<String> = map.sorted_paths().into_iter().cloned().collect();
    for path in paths {
        if is_reserved_path(&path) {
            continue;
        }
        let Some(file) = map.get(&path) else { continue };

        let (location, filename) = split_location_and_filename(&path);
        let title = filename_to_title(filename);
        let kind = classify(&path);

        if kind == ContentKind::Link {
            placeholder_targets.push(title);
            continue;
        }

        // Notes need their text; a failed fetch excludes the entry rather
        // than deriving it without fidelity.
        let note_text = match (kind, &file.state) {
            (ContentKind::Note, FileState::Fetched(text)) => Some(text.clone()),
            (ContentKind::Note, FileState::FetchFailed(message)) => {
                errors.push(LoadError::Fetch {
                    repo: repo.clone(),
                    path: path.clone(),
                    message: message.clone(),
                });
                continue;
            }
            (ContentKind::Note, FileState::NotFetched) => {
                warn!(repo = %repo, path = %path, "note listed but never fetched; skipping");
                continue;
            }
            _ => None,
        };

        let side = sidecar_path(&path);
        let meta = match map.get(&side) {
            Some(sidecar) => match &sidecar.state {
                FileState::Fetched(text) => match MetaData::parse(text) {
                    Some(meta) => meta,
                    None => {
                        warn!(repo = %repo, path = %path, "malformed sidecar; synthesizing");
                        let meta = MetaData::fresh(now);
                        staged.push((side.clone(), meta.to_yaml()));
                        meta
                    }
                },
                // Content unknown; overwriting it could destroy labels and
                // timestamps, so the whole entry sits out this load.
                FileState::FetchFailed(_) | FileState::NotFetched => {
                    errors.push(LoadError::SidecarUnavailable {
                        repo: repo.clone(),
                        path: path.clone(),
                    });
                    continue;
                }
            },
            None => {
                let meta = MetaData::fresh(now);
                staged.push((side.clone(), meta.to_yaml()));
                meta
            }
        };

        let extension = notepath::extension(&path).unwrap_or("").to_string();
        let key = Entry::file_key(repo, &path);
        let content = match note_text {
            Some(markdown) => {
                let rendered = renderer.render(&markdown);
                EntryContent::Note(NoteContent {
                    repo: repo.clone(),
                    location: location.to_string(),
                    extension,
                    time_created: meta.time_created,
                    time_updated: meta.time_updated,
                    markdown,
                    html: rendered.html,
                    link_targets: rendered.link_targets,
                })
            }
            None => EntryContent::Document(DocumentContent {
                repo: repo.clone(),
                location: location.to_string(),
                extension,
                time_created: meta.time_created,
                time_updated: meta.time_updated,
                raw_url: file.raw_url.clone(),
            }),
        };

        entries.push(Entry::new(title, meta.labels.clone(), content, key));
    }

    for (path, content) in staged {
        map.set_content(&path, content);
    }

    RepoExtraction {
        entries,
        placeholder_targets,
        errors,
    }
}

/// Rebuild link reference state from the freshly derived file entries.
///
/// Returns the emitted targets: every standalone link (in first-encounter
/// order), then every other link the first time a note references it.
/// Non-standalone links that end the pass with zero references are not
/// emitted and disappear from the result.
pub fn reconcile_links(arena: &mut LinkArena, file_entries: &[Entry]) -> Vec<String> {
    arena.reset_all();

    let mut emitted: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let standalone: Vec<String> = arena
        .targets()
        .filter(|target| arena.get(target).is_some_and(|record| record.standalone))
        .cloned()
        .collect();
    for target in standalone {
        seen.insert(target.clone());
        emitted.push(target);
    }

    for entry in file_entries {
        let EntryContent::Note(note) = &entry.content else {
            continue;
        };
        let labels = normalize_labels(&entry.labels);
        for target in &note.link_targets {
            let record = arena.synthesize(target);
            record.add_reference(&entry.key, &note.repo, &note.location, &labels);
            if seen.insert(target.clone()) {
                emitted.push(target.clone());
            }
        }
    }

    emitted
}

/// Produce the canonical sorted/indexed entry list from file entries plus
/// the link arena.
pub fn recompute_entries(file_entries: Vec<Entry>, arena: &mut LinkArena) -> Vec<Entry> {
    let emitted = reconcile_links(arena, &file_entries);

    let mut entries = file_entries;
    for target in emitted {
        let Some(record) = arena.get(&target) else {
            continue;
        };
        entries.push(Entry::new(
            record.title.clone(),
            record.labels.clone(),
            EntryContent::Link(record.to_content()),
            record.target.clone(),
        ));
    }

    sort_and_index(&mut entries);
    entries
}

/// Re-serialize each repo's link registry into its edit map so the next
/// commit persists the current link state.
///
/// A registry whose remote content could not be fetched is left alone: we
/// cannot prove the staged content is a superset of what is there.
pub fn stage_registries(arena: &LinkArena, edit: &mut MultiRepoFileMap) {
    for (key, map) in edit.iter_mut() {
        if let Some(file) = map.get(REGISTRY_PATH)
            && file.state.is_fetch_failed()
        {
            warn!(repo = %key, "registry content unavailable; not restaging");
            continue;
        }
        let records = arena.registry_records_for(key);
        if records.is_empty() && !map.contains(REGISTRY_PATH) {
            continue;
        }
        map.set_content(REGISTRY_PATH, serialize_registry(&records));
    }
}

/// One full reconciliation pass over the edit-side maps.
///
/// Extracts file entries per repo (staging synthesized sidecars), registers
/// bookmark placeholders as standalone links, rebuilds the link graph,
/// re-stages the registries, and returns the canonical entry list with the
/// accumulated data errors.
pub fn reconcile_all(
    edit: &mut MultiRepoFileMap,
    arena: &mut LinkArena,
    renderer: &dyn MarkdownRenderer,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut file_entries = Vec::new();
    let mut errors = Vec::new();
    let mut placeholders: Vec<(RepoKey, String)> = Vec::new();

    let keys: Vec<RepoKey> = edit.sorted_keys().into_iter().cloned().collect();
    for key in keys {
        let Some(map) = edit.get_mut(&key) else { continue };
        let extraction = extract_file_entries(&key, map, renderer, now);
        file_entries.extend(extraction.entries);
        errors.extend(extraction.errors);
        placeholders.extend(
            extraction
                .placeholder_targets
                .into_iter()
                .map(|target| (key.clone(), target)),
        );
    }

    for (repo, target) in placeholders {
        arena.ensure_standalone(&target, &repo);
    }

    let entries = recompute_entries(file_entries, arena);
    stage_registries(arena, edit);

    if !errors.is_empty() {
        warn!(count = errors.len(), "reconciliation finished with data errors");
    }
    debug!(
        entries = entries.len(),
        links = arena.len(),
        "reconciliation pass complete"
    );

    ReconcileOutcome { entries, errors }
}
