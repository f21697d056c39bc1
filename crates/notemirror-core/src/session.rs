//! Edit session: the live (original, edit) file-map pair and its derived
//! entry list.
//!
//! Exactly one session is live at a time. The original maps are what the
//! remote last confirmed; the edit maps accumulate every content-affecting
//! user action. A reload discards the session wholesale; a successful
//! commit promotes the edit maps to the new original. All mutation goes
//! through `&mut self` - the surrounding application serializes access.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::diff::{GitOp, diff_file_maps};
use crate::entry::{Entry, InvariantError, position_of};
use crate::file_map::{FileMap, MultiRepoFileMap};
use crate::links::LinkArena;
use crate::load::{LoadError, LoadOutcome};
use crate::metadata::sidecar_path;
use crate::reconcile::reconcile_all;
use crate::render::MarkdownRenderer;
use crate::repo::RepoKey;

/// One edit session over the loaded repos.
pub struct Session {
    original: MultiRepoFileMap,
    edit: MultiRepoFileMap,
    links: LinkArena,
    entries: Vec<Entry>,
}

impl Session {
    /// Start a session from a completed load.
    pub fn from_load(outcome: LoadOutcome) -> (Self, Vec<LoadError>) {
        let session = Self {
            original: outcome.original,
            edit: outcome.edit,
            links: outcome.links,
            entries: outcome.entries,
        };
        (session, outcome.errors)
    }

    /// The canonical entry list from the last reconciliation pass.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn links(&self) -> &LinkArena {
        &self.links
    }

    /// Direct access to a repo's edit map for content mutations.
    pub fn edit_map_mut(&mut self, repo: &RepoKey) -> Option<&mut FileMap> {
        self.edit.get_mut(repo)
    }

    /// Stage new content for a path.
    pub fn stage_write(&mut self, repo: &RepoKey, path: &str, content: String) {
        if let Some(map) = self.edit.get_mut(repo) {
            map.set_content(path, content);
        }
    }

    /// Stage a deletion of a path (and its metadata sidecar, if staged).
    pub fn stage_delete(&mut self, repo: &RepoKey, path: &str) {
        if let Some(map) = self.edit.get_mut(repo) {
            map.remove(path);
            map.remove(&sidecar_path(path));
        }
    }

    /// Re-run reconciliation after mutations: rebuilds the entry list and
    /// restages sidecars and registries into the edit maps.
    pub fn restage(
        &mut self,
        renderer: &dyn MarkdownRenderer,
        now: DateTime<Utc>,
    ) -> Vec<LoadError> {
        let outcome = reconcile_all(&mut self.edit, &mut self.links, renderer, now);
        self.entries = outcome.entries;
        outcome.errors
    }

    /// Per-repo mutation batches for the current edit state.
    pub fn pending_ops(&self) -> HashMap<RepoKey, Vec<GitOp>> {
        diff_file_maps(&self.original, &self.edit)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending_ops().is_empty()
    }

    /// After a successful commit of every pending batch, the edit state
    /// becomes the new original.
    pub fn promote(&mut self) {
        self.original = self.edit.clone();
    }

    /// Locate an entry that must exist (e.g. the one just modified).
    pub fn position_of(&self, key: &str) -> Result<usize, InvariantError> {
        position_of(&self.entries, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load_entries;
    use crate::remote::InMemoryRemote;
    use crate::render::PlainRenderer;
    use crate::repo::Repo;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn repo() -> Repo {
        Repo::new("alice", "notes", "main", "token")
    }

    async fn session_with(files: &[(&str, &str)]) -> Session {
        let remote = InMemoryRemote::new();
        remote.seed_repo(&repo(), files);
        let outcome = load_entries(&remote, &PlainRenderer, &[repo()], now()).await;
        let (session, errors) = Session::from_load(outcome);
        assert!(errors.is_empty());
        session
    }

    #[tokio::test]
    async fn test_restage_rebuilds_entries() {
        let mut session = session_with(&[("a.md", "alpha")]).await;
        assert_eq!(session.entries().len(), 1);

        let key = repo().key();
        session.stage_write(&key, "b.md", "beta [x](https://t)".to_string());
        session.restage(&PlainRenderer, now());

        let titles: Vec<&str> = session.entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "https://t"]);
    }

    #[tokio::test]
    async fn test_entry_key_survives_restage() {
        let mut session = session_with(&[("a.md", "alpha"), ("z.md", "zeta")]).await;
        let key = session.entries()[1].key.clone();

        session.stage_write(&repo().key(), "m.md", "middle".to_string());
        session.restage(&PlainRenderer, now());

        // idx shifted, key did not
        let pos = session.position_of(&key).unwrap();
        assert_eq!(session.entries()[pos].title, "z");
        assert_eq!(pos, 2);
    }

    #[tokio::test]
    async fn test_pending_ops_reflect_edits_only() {
        let mut session = session_with(&[("a.md", "alpha")]).await;
        // Staged sidecars from the load already count as pending writes
        let key = repo().key();
        let before = session.pending_ops();
        assert!(before[&key]
            .iter()
            .all(|op| matches!(op, GitOp::Write { path, .. } if path.starts_with(".notemirror/"))));

        session.stage_delete(&key, "a.md");
        let ops = session.pending_ops();
        assert!(ops[&key].contains(&GitOp::Delete {
            path: "a.md".to_string()
        }));
    }

    #[tokio::test]
    async fn test_promote_clears_pending() {
        let mut session = session_with(&[("a.md", "alpha")]).await;
        let key = repo().key();
        session.stage_write(&key, "a.md", "changed".to_string());
        assert!(session.has_pending_changes());

        session.promote();
        assert!(!session.has_pending_changes());
    }

    #[tokio::test]
    async fn test_position_of_missing_key_is_invariant_error() {
        let session = session_with(&[("a.md", "alpha")]).await;
        assert!(session.position_of("alice/notes:ghost.md").is_err());
    }
}
