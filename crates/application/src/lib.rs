//! Application services and ports for the kome status comment publisher.

#![forbid(unsafe_code)]

mod lease_lock;
mod metadata_service;
mod publish_ports;
mod publish_service;

pub use lease_lock::{LeaseGuard, LeaseLock, LeaseLockConfig};
pub use metadata_service::MetadataService;
pub use publish_ports::{
    Clock, CommentClient, MessageRenderer, MetadataStore, StoreMutation, StoreTransaction,
    StoreUpdateFn, SystemClock, TokenProvider,
};
pub use publish_service::{PublishOutcome, PublishService};
