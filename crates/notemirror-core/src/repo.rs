//! Repo: identity and access configuration for one mirrored repository.
//!
//! A `Repo` is created through configuration and never mutated afterwards.
//! Its `RepoKey` (owner + name) is the stable identity used for equality
//! and map lookups; the branch and token are access details that do not
//! participate in identity.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoKeyError {
    #[error("Invalid repo key format: expected owner/name")]
    InvalidFormat,
}

/// Stable identity of a repository: `owner/name`.
///
/// Two `Repo` configurations pointing at the same remote repository compare
/// equal through their keys even when branch or credentials differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoKey(String);

impl RepoKey {
    pub fn new(owner: &str, name: &str) -> Self {
        Self(format!("{}/{}", owner, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RepoKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoKey {
    type Err = RepoKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(RepoKeyError::InvalidFormat),
        }
    }
}

// Serialize as the "owner/name" string for consistency in logs and YAML
impl serde::Serialize for RepoKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RepoKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One mirrored remote repository.
#[derive(Debug, Clone)]
pub struct Repo {
    owner: String,
    name: String,
    branch: String,
    token: String,
}

impl Repo {
    pub fn new(owner: &str, name: &str, branch: &str, token: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Derived stable identity (owner + name).
    pub fn key(&self) -> RepoKey {
        RepoKey::new(&self.owner, &self.name)
    }
}

impl Display for Repo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}
