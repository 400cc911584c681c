//! Meridian Client Core - session consistency and retry engine
//!
//! This crate provides the client-side core of the Meridian multi-region
//! document store, implementing:
//! - Vector session tokens (version + global LSN + per-region LSN map)
//!   with parse/render, ordering, and monotone merge
//! - A process-wide session token container keyed by collection, with
//!   full-name aliasing and split-aware partition-range resolution
//! - A per-operation client retry policy differentiating read/write
//!   failure handling with endpoint marking and backoff
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │           Request Pipeline (external)        │
//! │     (transport, serialization, routing)     │
//! └───────┬─────────────────────┬───────────────┘
//!         │ attach/record       │ on failure
//! ┌───────┴──────────┐  ┌───────┴───────────────┐
//! │ SessionContainer │  │   ClientRetryPolicy    │
//! │ (token cache,    │  │ (decision + endpoint   │
//! │  merge-on-write) │  │  marking via manager)  │
//! └───────┬──────────┘  └───────┬───────────────┘
//!         │                     │
//! ┌───────┴──────────┐  ┌───────┴───────────────┐
//! │VectorSessionToken│  │ EndpointManager (trait)│
//! └──────────────────┘  └───────────────────────┘
//! ```
//!
//! The transport, wire serialization, and server-side consistency protocol
//! are external collaborators: the pipeline feeds response headers into the
//! container and failed attempts into the policy.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod request;
pub mod retry;
pub mod session;

pub use error::{Error, Result};
pub use retry::{ClientRetryPolicy, EndpointManager, RetryDecision, RetryOptions};
pub use session::{SessionContainer, VectorSessionToken};
