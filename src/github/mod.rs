//! GitHub repository contents API client

pub mod client;
pub mod errors;
pub mod types;

pub use client::{GitHubClient, GitHubSettings, DEFAULT_API_URL};
pub use errors::GitHubError;
