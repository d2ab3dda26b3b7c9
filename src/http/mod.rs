//! HTTP façade
//!
//! Axum router exposing upload, serve, admin and status endpoints over a
//! shared [`CdnService`](crate::service::CdnService).

pub mod error;
pub mod mime;
pub mod protocol;
pub mod server;

pub use server::{router, AppState};
