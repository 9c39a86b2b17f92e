//! Repository gateway for the GitHub Contents API.
//!
//! # Module Structure
//!
//! - [`client`] - `RepoGateway`: directory listing with relay fallback,
//!   single-file reads, sha-preconditioned writes and deletes
//! - [`types`] - Wire types, base64 content codec and rate limit headers

mod client;
mod types;

pub use client::{
    DIRECT_RELAY, GITHUB_API_BASE, GatewayOptions, RAW_CONTENT_BASE, RepoGateway, WRAPPING_RELAY,
};
pub use types::{CommitInfo, CommitResult, RateLimitInfo, RepoFile, decode_content, encode_content};
