//! notemirror-core: reconciliation and diff engine for git-hosted note mirrors.
//!
//! This crate provides the core functionality for:
//! - Tracking original-vs-edited state per path in per-repo file maps
//! - Deriving a stably-identified entry set (notes, documents, links) from
//!   raw files, metadata sidecars and the persisted link registry
//! - Diffing file-map pairs into minimal per-repo mutation batches
//! - Merging a batch into a remote tree snapshot and replaying it as a
//!   single commit
//! - RemoteStore and MarkdownRenderer trait abstractions for the
//!   collaborators that live outside the engine

pub mod commit;
pub mod diff;
pub mod entry;
pub mod file_map;
pub mod links;
pub mod load;
pub mod metadata;
pub mod reconcile;
pub mod remote;
pub mod render;
pub mod repo;
pub mod session;

pub use commit::{CommitError, commit, merge_tree};
pub use diff::{GitOp, diff_file_map, diff_file_maps};
pub use entry::{Entry, EntryContent, InvariantError, position_of, sort_and_index};
pub use file_map::{File, FileMap, FileState, MultiRepoFileMap};
pub use links::{LinkArena, LinkRecord};
pub use load::{LoadError, LoadOutcome, load_entries};
pub use metadata::{LinkRegistryRecord, MetaData};
pub use reconcile::{recompute_entries, reconcile_all};
pub use remote::{InMemoryRemote, RemoteError, RemoteStore};
pub use render::{MarkdownRenderer, PlainRenderer, RenderedNote};
pub use repo::{Repo, RepoKey};
pub use session::Session;
