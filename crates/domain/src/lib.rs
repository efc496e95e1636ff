//! Domain types for the kome status comment publisher.

#![forbid(unsafe_code)]

mod pull_request;
mod records;

pub use pull_request::{CommitSha, PullRequestRef};
pub use records::{CommentRecord, LeaseRecord, PublishContext};
