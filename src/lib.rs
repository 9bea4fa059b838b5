//! fieldsync - offline-first photo cache and upload queue.
//!
//! This crate keeps field work going without a network: photos are queued
//! durably on disk and delivered in order once the backend is reachable,
//! and images are shown from a local thumbnail cache first.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the sync orchestrator and engine facade.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing storage, network and config adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "fieldsync";
