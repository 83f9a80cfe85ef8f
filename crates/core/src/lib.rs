//! `reqwatch-core`: domain building blocks shared by the tracker crates.
//!
//! This crate contains **pure domain** primitives (no IO, no threads): job
//! identity, the interests a job declares, and its activity window.

pub mod error;
pub mod id;
pub mod interest;
pub mod job;
pub mod window;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, RunId};
pub use interest::Interest;
pub use job::{Initiator, InitiatorKind, Job};
pub use window::ActivityWindow;
