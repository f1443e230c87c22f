//! Helpers for resolving the commit [`Identity`] from configuration, environment variables or
//! Git configuration.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use git2::Repository;
use gitnotes_core::Identity;

/// Environment variable checked first for the author name.
pub const ENV_AUTHOR_NAME: &str = "GITNOTES_AUTHOR_NAME";
/// Environment variable checked first for the author email.
pub const ENV_AUTHOR_EMAIL: &str = "GITNOTES_AUTHOR_EMAIL";
/// Name used for merge commits when no identity can be resolved.
pub const MERGE_AUTHOR_NAME: &str = "gitnotes";
/// Email used for merge commits when no identity can be resolved.
pub const MERGE_AUTHOR_EMAIL: &str = "gitnotes@localhost.invalid";

const FALLBACK_AUTHOR_NAME_ENV: &str = "GIT_AUTHOR_NAME";
const FALLBACK_AUTHOR_EMAIL_ENV: &str = "GIT_AUTHOR_EMAIL";

/// Resolve an identity purely from environment variables.
///
/// Checks `GITNOTES_AUTHOR_NAME`/`GITNOTES_AUTHOR_EMAIL` first and then the conventional
/// `GIT_AUTHOR_*` variables.
///
/// # Errors
/// Returns an error if either the name or email cannot be resolved from the environment.
pub fn identity_from_env() -> Result<Identity> {
    let mut fetch = |key: &'static str| env::var(key).ok();
    identity_from_env_with(&mut fetch)
}

/// Resolve an identity from the Git configuration of the repository at `workdir`, which
/// includes the global and system files.
///
/// # Errors
/// Returns an error when the repository cannot be opened or `user.name`/`user.email` are missing.
pub fn identity_from_git_config(workdir: &Path) -> Result<Identity> {
    let repo = Repository::open(workdir)?;
    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .context("user.name not configured in Git")?;
    let email = config
        .get_string("user.email")
        .context("user.email not configured in Git")?;
    usable(Identity { name, email }).context("Git identity is blank")
}

/// Resolve the commit identity in order: `configured` → environment → Git configuration.
#[must_use]
pub fn resolve_identity(configured: Option<&Identity>, workdir: &Path) -> Option<Identity> {
    let mut fetch = |key: &'static str| env::var(key).ok();
    resolve_identity_with(configured, workdir, &mut fetch)
}

fn resolve_identity_with(
    configured: Option<&Identity>,
    workdir: &Path,
    fetch: &mut impl FnMut(&'static str) -> Option<String>,
) -> Option<Identity> {
    configured
        .cloned()
        .and_then(usable)
        .or_else(|| identity_from_env_with(fetch).ok())
        .or_else(|| identity_from_git_config(workdir).ok())
}

/// Identity for merge commits: the resolved one, or a fixed placeholder.
#[must_use]
pub fn merge_identity(resolved: Option<Identity>) -> Identity {
    resolved.unwrap_or_else(|| Identity {
        name: MERGE_AUTHOR_NAME.to_owned(),
        email: MERGE_AUTHOR_EMAIL.to_owned(),
    })
}

fn usable(identity: Identity) -> Option<Identity> {
    let blank = identity.name.trim().is_empty() || identity.email.trim().is_empty();
    (!blank).then_some(identity)
}

fn env_value_with(
    candidates: &[&'static str],
    fetch: &mut impl FnMut(&'static str) -> Option<String>,
) -> Option<String> {
    candidates
        .iter()
        .find_map(|key| fetch(key).filter(|value| !value.trim().is_empty()))
}

fn identity_from_env_with(fetch: &mut impl FnMut(&'static str) -> Option<String>) -> Result<Identity> {
    let name = env_value_with(&[ENV_AUTHOR_NAME, FALLBACK_AUTHOR_NAME_ENV], fetch)
        .context("environment does not include an author name")?;
    let email = env_value_with(&[ENV_AUTHOR_EMAIL, FALLBACK_AUTHOR_EMAIL_ENV], fetch)
        .context("environment does not include an author email")?;
    Ok(Identity { name, email })
}
