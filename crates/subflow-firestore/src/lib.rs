//! Firestore REST API client for the Subflow backend.
//!
//! This crate provides:
//! - Service account authentication via gcp_auth with token caching
//! - Document reads and writes with `updateTime` preconditions
//! - Retry with exponential backoff and jitter
//! - A typed repository for per-user credit documents

pub mod client;
pub mod credit_docs;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use credit_docs::{CreditDocRepository, CreditUpdate, CreditWriteResult};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
