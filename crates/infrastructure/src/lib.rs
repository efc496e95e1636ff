//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod filesystem_metadata_collector;
mod firebase_metadata_store;
mod github_comment_client;
mod github_token_provider;
mod in_memory_metadata_store;

pub use filesystem_metadata_collector::collect_metadata;
pub use firebase_metadata_store::FirebaseMetadataStore;
pub use github_comment_client::GitHubCommentClient;
pub use github_token_provider::{GitHubAppTokenProvider, GitHubCredentials, StaticTokenProvider};
pub use in_memory_metadata_store::InMemoryMetadataStore;
