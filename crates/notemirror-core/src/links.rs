//! Link arena: the owning store of link state across reconciliation passes.
//!
//! Links are derived objects (from registry files and from note text) whose
//! identity must survive repeated passes: the arena keys records by target
//! string and resets them in place instead of rebuilding, so a record's
//! identity is exactly its target key. The reconciliation engine is the
//! sole writer during a pass; callers see link state only through the
//! entry snapshots taken after the pass completes.

use std::collections::HashMap;

use tracing::warn;

use crate::entry::LinkContent;
use crate::metadata::{LinkRegistryRecord, normalize_labels};
use crate::repo::RepoKey;

/// Mutable link state, rebuilt in place per reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub title: String,
    /// Globally unique key within the link graph.
    pub target: String,
    /// The link's own labels, kept across resets.
    pub own_labels: Vec<String>,
    /// Explicitly created by the user; persists with zero references.
    pub standalone: bool,
    /// Repo whose registry (or placeholder file) introduced this record;
    /// owns the record when nothing references it.
    pub origin: Option<RepoKey>,
    /// Entry keys of referencing notes. Reset each pass.
    pub backrefs: Vec<String>,
    /// Referencing repos, insertion order, deduplicated. Reset each pass.
    pub repos: Vec<RepoKey>,
    /// Referencing locations, insertion order, deduplicated. Reset each pass.
    pub locations: Vec<String>,
    /// Aggregated label set: own labels plus referencing notes' labels.
    pub labels: Vec<String>,
}

impl LinkRecord {
    pub fn new(title: String, target: String, own_labels: Vec<String>, standalone: bool) -> Self {
        let labels = normalize_labels(&own_labels);
        Self {
            title,
            target,
            own_labels,
            standalone,
            origin: None,
            backrefs: Vec::new(),
            repos: Vec::new(),
            locations: Vec::new(),
            labels,
        }
    }

    /// Reset derived state for a new pass: reference lists empty, label set
    /// back to the record's own labels.
    pub fn reset(&mut self) {
        self.backrefs.clear();
        self.repos.clear();
        self.locations.clear();
        self.labels = normalize_labels(&self.own_labels);
    }

    /// Record a reference from a note entry.
    ///
    /// A note linking to the same target more than once still counts as a
    /// single back-reference.
    pub fn add_reference(
        &mut self,
        entry_key: &str,
        repo: &RepoKey,
        location: &str,
        labels: &[String],
    ) {
        if !self.backrefs.iter().any(|key| key == entry_key) {
            self.backrefs.push(entry_key.to_string());
        }
        if !self.repos.contains(repo) {
            self.repos.push(repo.clone());
        }
        if !self.locations.iter().any(|loc| loc == location) {
            self.locations.push(location.to_string());
        }
        if !labels.is_empty() {
            let merged = normalize_labels(
                self.labels
                    .iter()
                    .map(String::as_str)
                    .chain(labels.iter().map(String::as_str)),
            );
            self.labels = merged;
        }
        if self.origin.is_none() {
            self.origin = Some(repo.clone());
        }
    }

    /// Snapshot for an entry payload.
    pub fn to_content(&self) -> LinkContent {
        LinkContent {
            target: self.target.clone(),
            backrefs: self.backrefs.clone(),
            repos: self.repos.clone(),
            locations: self.locations.clone(),
            standalone: self.standalone,
            own_labels: self.own_labels.clone(),
        }
    }
}

/// Arena of link records indexed by target string.
///
/// Insertion order is tracked so passes emit standalone links in the order
/// they were first encountered.
#[derive(Debug, Clone, Default)]
pub struct LinkArena {
    records: HashMap<String, LinkRecord>,
    order: Vec<String>,
}

impl LinkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record loaded from a repo's registry file.
    ///
    /// Duplicate targets are dropped with a warning: the link set has
    /// unique targets, and a duplicate can only come from externally
    /// edited registry data.
    pub fn seed_registry_record(&mut self, record: LinkRegistryRecord, origin: &RepoKey) {
        if self.records.contains_key(&record.target) {
            warn!(
                target = %record.target,
                repo = %origin,
                "duplicate link target in registry; dropping"
            );
            return;
        }
        let mut link = LinkRecord::new(
            record.title,
            record.target.clone(),
            record.own_labels,
            record.standalone,
        );
        link.origin = Some(origin.clone());
        self.order.push(record.target.clone());
        self.records.insert(record.target, link);
    }

    /// Ensure a standalone record exists for a bookmark placeholder file.
    pub fn ensure_standalone(&mut self, target: &str, origin: &RepoKey) {
        match self.records.get_mut(target) {
            Some(record) => {
                record.standalone = true;
                if record.origin.is_none() {
                    record.origin = Some(origin.clone());
                }
            }
            None => {
                let mut record =
                    LinkRecord::new(target.to_string(), target.to_string(), Vec::new(), true);
                record.origin = Some(origin.clone());
                self.order.push(target.to_string());
                self.records.insert(target.to_string(), record);
            }
        }
    }

    /// Synthesize a record for a target first seen in note text.
    pub fn synthesize(&mut self, target: &str) -> &mut LinkRecord {
        if !self.records.contains_key(target) {
            self.order.push(target.to_string());
            self.records.insert(
                target.to_string(),
                LinkRecord::new(target.to_string(), target.to_string(), Vec::new(), false),
            );
        }
        self.records.get_mut(target).expect("just inserted")
    }

    pub fn get(&self, target: &str) -> Option<&LinkRecord> {
        self.records.get(target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut LinkRecord> {
        self.records.get_mut(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.records.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Targets in first-encounter order.
    pub fn targets(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Reset every record for a new pass.
    pub fn reset_all(&mut self) {
        for record in self.records.values_mut() {
            record.reset();
        }
    }

    /// Registry records this repo persists: links whose sole referencing
    /// repo it is, plus reference-free standalone links it originates.
    pub fn registry_records_for(&self, repo: &RepoKey) -> Vec<LinkRegistryRecord> {
        let mut records = Vec::new();
        for target in &self.order {
            let link = &self.records[target];
            let owned = match link.repos.as_slice() {
                [] => link.standalone && link.origin.as_ref() == Some(repo),
                [sole] => sole == repo,
                _ => false,
            };
            if owned {
                records.push(LinkRegistryRecord {
                    title: link.title.clone(),
                    target: link.target.clone(),
                    own_labels: link.own_labels.clone(),
                    standalone: link.standalone,
                });
            }
        }
        records
    }
}
