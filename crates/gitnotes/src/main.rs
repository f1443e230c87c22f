//! CLI entry point for gitnotes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use gitnotes_app::AppConfig;
use gitnotes_app::config::{CONFIG_DIR, CONFIG_FILE};

mod commands;

/// Notes as plain files, synced through a git remote over HTTPS.
#[derive(Parser, Debug)]
#[command(
    name = "gitnotes",
    version,
    about = "gitnotes: notes kept as text files and synced with a git remote"
)]
struct Cli {
    /// Configuration file (defaults to `<config dir>/gitnotes/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage root overriding the configured one.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the username and token used for HTTPS remotes, replacing any previous login.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        token: String,
    },

    /// Manage notes in the local note store.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Commit every note into a repository.
    Commit {
        /// Repository name.
        repo: String,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Push a repository to its remote after verifying the remote.
    Push {
        /// Repository name.
        repo: String,
        /// Remote URL overriding the configured one.
        #[arg(long)]
        url: Option<String>,
        /// Overwrite remote history.
        #[arg(long)]
        force: bool,
    },

    /// Pull a repository from its remote and reload the note store.
    Pull {
        /// Repository name.
        repo: String,
        /// Remote URL overriding the configured one.
        #[arg(long)]
        url: Option<String>,
        /// Discard local commits that are not on the remote.
        #[arg(long)]
        force: bool,
    },

    /// Clone a remote into a new local repository and load its notes.
    Clone {
        url: String,
        /// Local repository name (derived from the URL by default).
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete every local repository. Notes in the note store are kept.
    Purge {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NoteAction {
    /// Add a note.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Change the title or body of a note.
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// List notes.
    Ls,
    /// Remove a note by id.
    Rm { id: u64 },
}

fn main() -> Result<ExitCode> {
    let Cli { config, root, cmd } = Cli::parse();
    install_tracing();

    let config_path = match config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = AppConfig::load(&config_path)?;
    let root = match root {
        Some(root) => root,
        None => config.storage_root(&default_storage_root()?),
    };
    commands::run(cmd, &config, &root)
}

fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("cannot determine the user config directory")?;
    Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn default_storage_root() -> Result<PathBuf> {
    let dir = dirs::data_dir().context("cannot determine the user data directory")?;
    Ok(dir.join(CONFIG_DIR))
}

fn install_tracing() {
    // RUST_LOG is honoured; INFO by default.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_push_command() {
        let cli = Cli::parse_from(["gitnotes", "--root", "/tmp/notes", "push", "notes", "--force"]);

        assert_eq!(cli.root, Some(PathBuf::from("/tmp/notes")));
        match cli.cmd {
            Command::Push { repo, url, force } => {
                assert_eq!(repo, "notes");
                assert!(url.is_none());
                assert!(force);
            }
            _ => panic!("expected push command"),
        }
    }

    #[test]
    fn parse_note_add_command() {
        let cli = Cli::parse_from(["gitnotes", "note", "add", "--title", "Groceries", "--body", "milk"]);

        match cli.cmd {
            Command::Note {
                action: NoteAction::Add { title, body },
            } => {
                assert_eq!(title, "Groceries");
                assert_eq!(body, "milk");
            }
            _ => panic!("expected note add command"),
        }
    }

    #[test]
    fn parse_clone_command() {
        let cli = Cli::parse_from([
            "gitnotes",
            "clone",
            "https://example.invalid/jane/notes.git",
            "--config",
            "/etc/gitnotes.toml",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/gitnotes.toml")));
        match cli.cmd {
            Command::Clone { url, name } => {
                assert_eq!(url, "https://example.invalid/jane/notes.git");
                assert!(name.is_none());
            }
            _ => panic!("expected clone command"),
        }
    }

    #[test]
    fn pull_force_defaults_to_false() {
        let cli = Cli::parse_from(["gitnotes", "pull", "notes"]);
        assert!(matches!(cli.cmd, Command::Pull { force: false, .. }));
    }
}
