//! Command line and environment configuration

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::github::types::Committer;
use crate::github::{GitHubSettings, DEFAULT_API_URL};

#[derive(Parser, Debug)]
#[command(version, about = "Serve files committed to a GitHub repository as a CDN", long_about = None)]
pub struct Args {
    /// Remote store backend
    #[arg(long, env = "REPOCDN_BACKEND", value_enum, default_value_t = Backend::Github)]
    pub backend: Backend,

    /// Repository owner (user or organisation)
    #[arg(long, env = "GITHUB_OWNER")]
    pub owner: Option<String>,

    /// Repository name
    #[arg(long, env = "GITHUB_REPO")]
    pub repo: Option<String>,

    /// Access token with contents read/write permission
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Branch to read and commit to (repository default when unset)
    #[arg(long, env = "GITHUB_BRANCH")]
    pub branch: Option<String>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Public domain files are served under
    #[arg(long, env = "CDN_DOMAIN")]
    pub cdn_domain: Option<String>,

    /// Listening host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory for uploads without an explicit path
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: String,

    /// Directories indexed by a resync (root and upload dir when unset)
    #[arg(long = "sync-path", env = "SYNC_PATHS", value_delimiter = ',')]
    pub sync_paths: Vec<String>,

    /// Seconds between full resyncs
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 3600)]
    pub resync_interval_secs: u64,

    /// Largest accepted upload body
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 26_214_400)]
    pub max_upload_bytes: usize,

    /// Committer identity as `Name <email>`
    #[arg(long, env = "COMMIT_AUTHOR")]
    pub commit_author: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Resync once and print the indexed files
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// GitHub repository contents API
    Github,
    /// Volatile in-process store for local development
    Memory,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub backend: Backend,
    /// Present for the github backend
    pub github: Option<GitHubSettings>,
    pub owner: String,
    pub repo: String,
    pub cdn_domain: String,
    pub host: String,
    pub port: u16,
    pub upload_dir: String,
    pub sync_paths: Vec<String>,
    pub resync_interval: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Validate arguments, reporting every problem at once
    pub fn from_args(args: Args) -> Result<Self> {
        let mut errors = Vec::new();

        let cdn_domain = non_empty(args.cdn_domain);
        if cdn_domain.is_none() {
            errors.push("CDN_DOMAIN must be set".to_string());
        }

        let committer = match non_empty(args.commit_author) {
            Some(value) => match Committer::parse(&value) {
                Some(c) => Some(c),
                None => {
                    errors.push(format!("COMMIT_AUTHOR `{}` is not of the form `Name <email>`", value));
                    None
                }
            },
            None => None,
        };

        if args.resync_interval_secs == 0 {
            errors.push("RESYNC_INTERVAL_SECS must be greater than zero".to_string());
        }
        if args.max_upload_bytes == 0 {
            errors.push("MAX_UPLOAD_BYTES must be greater than zero".to_string());
        }

        let owner = non_empty(args.owner);
        let repo = non_empty(args.repo);
        let token = non_empty(args.token);

        let github = match args.backend {
            Backend::Github => {
                for (value, name) in [(&owner, "GITHUB_OWNER"), (&repo, "GITHUB_REPO"), (&token, "GITHUB_TOKEN")] {
                    if value.is_none() {
                        errors.push(format!("{} must be set for the github backend", name));
                    }
                }
                match (&owner, &repo, &token) {
                    (Some(owner), Some(repo), Some(token)) => Some(GitHubSettings {
                        api_url: args.api_url.trim_end_matches('/').to_string(),
                        owner: owner.clone(),
                        repo: repo.clone(),
                        token: token.clone(),
                        branch: non_empty(args.branch),
                        committer,
                    }),
                    _ => None,
                }
            }
            Backend::Memory => None,
        };

        if !errors.is_empty() {
            bail!("invalid configuration:\n  {}", errors.join("\n  "));
        }

        let upload_dir = args.upload_dir.trim().trim_matches('/').to_string();
        let sync_paths = if args.sync_paths.is_empty() {
            vec![String::new(), upload_dir.clone()]
        } else {
            args.sync_paths
                .iter()
                .map(|p| p.trim().trim_matches('/').to_string())
                .collect()
        };

        Ok(Config {
            command: args.command.unwrap_or(Command::Serve),
            backend: args.backend,
            github,
            owner: owner.unwrap_or_else(|| "local".to_string()),
            repo: repo.unwrap_or_else(|| "memory".to_string()),
            cdn_domain: cdn_domain.unwrap_or_default(),
            host: args.host,
            port: args.port,
            upload_dir,
            sync_paths,
            resync_interval: Duration::from_secs(args.resync_interval_secs),
            max_upload_bytes: args.max_upload_bytes,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
