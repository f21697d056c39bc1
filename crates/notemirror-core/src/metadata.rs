//! Per-file metadata sidecars and the per-repo link registry.
//!
//! Everything the engine persists about a repo besides the content files
//! themselves lives under a reserved directory:
//!
//! - `.notemirror/meta/{originalPath}.yaml` - one sidecar per tracked
//!   Note/Document with `{labels, timeCreated, timeUpdated}`
//! - `.notemirror/links.yaml` - the repo's link registry, a list of
//!   `{title, target, ownLabels, standalone}` records
//!
//! Parsing is lenient: malformed YAML degrades to `None` and the caller
//! synthesizes a fresh record. Serialization is deterministic so staged
//! registry content diffs cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved subdirectory; nothing under it derives an entry.
pub const RESERVED_DIR: &str = ".notemirror";

/// Subdirectory of [`RESERVED_DIR`] holding metadata sidecars.
pub const META_DIR: &str = ".notemirror/meta";

/// Well-known path of the per-repo link registry.
pub const REGISTRY_PATH: &str = ".notemirror/links.yaml";

/// Whether a path belongs to the engine rather than the user.
pub fn is_reserved_path(path: &str) -> bool {
    path == RESERVED_DIR || path.starts_with(".notemirror/")
}

/// Sidecar path of a content file.
pub fn sidecar_path(content_path: &str) -> String {
    format!("{}/{}.yaml", META_DIR, content_path)
}

/// Per-file sidecar record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    #[serde(default)]
    pub labels: Vec<String>,
    pub time_created: DateTime<Utc>,
    pub time_updated: DateTime<Utc>,
}

impl MetaData {
    /// Fresh metadata for a file seen for the first time.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            labels: Vec::new(),
            time_created: now,
            time_updated: now,
        }
    }

    /// Parse a sidecar. Malformed content yields `None`; the caller
    /// synthesizes fresh metadata and stages a corrective write.
    pub fn parse(text: &str) -> Option<Self> {
        serde_yaml::from_str(text).ok()
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }
}

/// One persisted link record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRegistryRecord {
    pub title: String,
    pub target: String,
    #[serde(default)]
    pub own_labels: Vec<String>,
    #[serde(default)]
    pub standalone: bool,
}

/// Parse a registry file into its records. Malformed content yields `None`.
pub fn parse_registry(text: &str) -> Option<Vec<LinkRegistryRecord>> {
    serde_yaml::from_str(text).ok()
}

/// Serialize registry records to the staged file content.
pub fn serialize_registry(records: &[LinkRegistryRecord]) -> String {
    serde_yaml::to_string(records).unwrap_or_default()
}

/// Normalize a label union: lowercase, dedup, sort.
pub fn normalize_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = labels
        .into_iter()
        .map(|label| label.as_ref().to_lowercase())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = MetaData {
            labels: vec!["work".to_string(), "urgent".to_string()],
            time_created: now(),
            time_updated: now(),
        };

        let yaml = meta.to_yaml();
        let parsed = MetaData::parse(&yaml).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_metadata_field_names_are_camel_case() {
        let yaml = MetaData::fresh(now()).to_yaml();
        assert!(yaml.contains("timeCreated"));
        assert!(yaml.contains("timeUpdated"));
    }

    #[test]
    fn test_metadata_parse_malformed_is_none() {
        assert!(MetaData::parse("not: [valid").is_none());
        assert!(MetaData::parse("just a string").is_none());
    }

    #[test]
    fn test_metadata_missing_labels_defaults_empty() {
        let yaml = "timeCreated: 2024-03-01T12:00:00Z\ntimeUpdated: 2024-03-01T12:00:00Z\n";
        let parsed = MetaData::parse(yaml).unwrap();
        assert!(parsed.labels.is_empty());
    }

    #[test]
    fn test_registry_roundtrip() {
        let records = vec![
            LinkRegistryRecord {
                title: "Rust".to_string(),
                target: "https://rust-lang.org".to_string(),
                own_labels: vec!["lang".to_string()],
                standalone: true,
            },
            LinkRegistryRecord {
                title: "https://docs.rs".to_string(),
                target: "https://docs.rs".to_string(),
                own_labels: vec![],
                standalone: false,
            },
        ];

        let yaml = serialize_registry(&records);
        assert!(yaml.contains("ownLabels"));
        assert_eq!(parse_registry(&yaml).unwrap(), records);
    }

    #[test]
    fn test_registry_parse_malformed_is_none() {
        assert!(parse_registry("{{{{").is_none());
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path("notes/Todo.md"),
            ".notemirror/meta/notes/Todo.md.yaml"
        );
    }

    #[test]
    fn test_reserved_paths() {
        assert!(is_reserved_path(REGISTRY_PATH));
        assert!(is_reserved_path(".notemirror/meta/a.md.yaml"));
        assert!(is_reserved_path(RESERVED_DIR));
        assert!(!is_reserved_path("notes/a.md"));
        assert!(!is_reserved_path(".notemirror-lookalike/a.md"));
    }

    #[test]
    fn test_normalize_labels() {
        let labels = normalize_labels(["Work", "work", "URGENT", "home"]);
        assert_eq!(labels, vec!["home", "urgent", "work"]);
    }
}
