use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical repository as known to the profile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Owning profile.
    #[serde(default)]
    pub profile: String,
    /// Repository name, also the local directory name.
    pub name: String,
    /// HTTPS remote; empty when the repository is local-only.
    #[serde(default)]
    pub remote_url: String,
}

impl RepositoryDescriptor {
    /// Describe a repository.
    pub fn new(profile: impl Into<String>, name: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            name: name.into(),
            remote_url: remote_url.into(),
        }
    }

    /// Remote URL, or `None` for local-only repositories.
    #[must_use]
    pub fn remote(&self) -> Option<&str> {
        let url = self.remote_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Username/token pair used for HTTPS transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Profile (user) name.
    pub username: String,
    /// Personal access token.
    pub token: String,
}

impl Credential {
    /// Build a credential.
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// An empty token means no credential is available.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Author/committer identity for commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Whether `name` can be used verbatim as a single path segment.
#[must_use]
pub fn is_path_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && name.trim() == name
}

/// Derive a repository name from a remote URL: the last path segment without `.git`.
#[must_use]
pub fn repository_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    is_path_safe_name(name).then(|| name.to_owned())
}
