use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use gitnotes_app::{
    AppConfig, AsyncSyncEngine, CredentialStore, FileCredentialStore, JsonNoteStore, SyncEngine,
};
use gitnotes_core::{Credential, RepositoryDescriptor, repository_name_from_url};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::Command;

mod notes;
mod sync;

/// Execute one CLI command against the storage under `root`.
pub fn run(cmd: Command, config: &AppConfig, root: &Path) -> Result<ExitCode> {
    debug!(root = %root.display(), "using storage root");
    let credentials = FileCredentialStore::open(root);

    match cmd {
        Command::Login { username, token } => {
            credentials.replace(Credential::new(username.as_str(), token))?;
            println!("Logged in as '{username}'");
            Ok(ExitCode::SUCCESS)
        }
        Command::Note { action } => notes::run(action, &JsonNoteStore::open(root)),
        Command::Commit { repo, message } => {
            let descriptor = resolve_descriptor(config, &repo, None, None);
            let engine = async_engine(config, root);
            Ok(Runtime::new()?.block_on(sync::run_commit(&engine, descriptor, message)))
        }
        Command::Push { repo, url, force } => {
            let credential = credentials.get_credentials()?;
            let descriptor = resolve_descriptor(config, &repo, url, credential.as_ref());
            let engine = async_engine(config, root);
            Ok(Runtime::new()?.block_on(sync::run_push(&engine, descriptor, credential, force)))
        }
        Command::Pull { repo, url, force } => {
            let credential = credentials.get_credentials()?;
            let descriptor = resolve_descriptor(config, &repo, url, credential.as_ref());
            let engine = async_engine(config, root);
            Ok(Runtime::new()?.block_on(sync::run_pull(&engine, descriptor, credential, force)))
        }
        Command::Clone { url, name } => {
            let name = name
                .or_else(|| repository_name_from_url(&url))
                .context("cannot derive a repository name from the URL; pass --name")?;
            let credential = credentials.get_credentials()?;
            let descriptor = resolve_descriptor(config, &name, Some(url), credential.as_ref());
            let engine = async_engine(config, root);
            Ok(Runtime::new()?.block_on(sync::run_clone(&engine, descriptor, credential)))
        }
        Command::Purge { yes } => {
            if !yes {
                eprintln!("Refusing to delete local repositories without --yes");
                return Ok(ExitCode::FAILURE);
            }
            let engine = async_engine(config, root);
            Ok(Runtime::new()?.block_on(sync::run_purge(&engine)))
        }
    }
}

fn async_engine(config: &AppConfig, root: &Path) -> AsyncSyncEngine<JsonNoteStore> {
    let store = JsonNoteStore::open(root);
    let engine = SyncEngine::new(config.sync_settings(root));
    AsyncSyncEngine::new(engine, store, config.sync.workers)
}

/// Configured descriptor for `name`, or a local-only one, with `url` overriding the remote.
fn resolve_descriptor(
    config: &AppConfig,
    name: &str,
    url: Option<String>,
    credential: Option<&Credential>,
) -> RepositoryDescriptor {
    let mut descriptor = config.repository(name).unwrap_or_else(|| {
        let profile = credential.map(|cred| cred.username.as_str()).unwrap_or_default();
        RepositoryDescriptor::new(profile, name, "")
    });
    if let Some(url) = url {
        descriptor.remote_url = url;
    }
    descriptor
}
