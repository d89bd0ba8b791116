use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use ghsm_core::model::{Scope, Visibility};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "ghsm",
    about = "Encrypt and upload GitHub Actions secrets from a CSV file",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create or update every secret listed in a CSV file.
    Push(PushArgs),
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeKind {
    Repo,
    Org,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VisibilityArg {
    All,
    Private,
    Selected,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PushArgs {
    /// Write to a single repository or to an organization.
    #[arg(short = 't', long = "type", value_enum)]
    pub kind: ScopeKind,
    /// Repository owner, or the organization name.
    #[arg(short, long)]
    pub owner: String,
    /// Repository name (required with `--type repo`).
    #[arg(short, long, required_if_eq("kind", "repo"))]
    pub repo: Option<String>,
    /// CSV file with `secret_name` and `secret_value` columns.
    #[arg(short, long)]
    pub file: PathBuf,
    /// Which repositories may use an organization secret.
    #[arg(long, value_enum, default_value_t = VisibilityArg::Private)]
    pub visibility: VisibilityArg,
    /// Repository id allowed to use an organization secret; repeat for several.
    #[arg(
        long = "selected-repo",
        value_name = "ID",
        required_if_eq("visibility", "selected")
    )]
    pub selected_repos: Vec<u64>,
    /// API base URL, for GitHub Enterprise Server.
    #[arg(long)]
    pub api_base: Option<String>,
    /// Environment variable holding the access token.
    #[arg(long, default_value = "GITHUB_TOKEN")]
    pub token_env: String,
    /// Print outcomes as JSON.
    #[arg(long)]
    pub json: bool,
}

impl PushArgs {
    /// Target scope described by the arguments.
    pub fn scope(&self) -> Result<Scope> {
        match self.kind {
            ScopeKind::Repo => {
                let repo = self
                    .repo
                    .as_deref()
                    .ok_or_else(|| eyre!("--repo is required with --type repo"))?;
                Ok(Scope::repository(&self.owner, repo)?)
            }
            ScopeKind::Org => {
                let visibility = match self.visibility {
                    VisibilityArg::All => Visibility::All,
                    VisibilityArg::Private => Visibility::Private,
                    VisibilityArg::Selected => Visibility::Selected {
                        repository_ids: self.selected_repos.clone(),
                    },
                };
                Ok(Scope::organization(&self.owner, Some(visibility))?)
            }
        }
    }
}
