//! Core types and trait definitions for the Elicit evidence store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod confidence;
pub mod curation;
pub mod dedup;
pub mod error;
pub mod evidence;
pub mod export;
pub mod labelling;
pub mod record;
pub mod schema;
pub mod store;

pub use confidence::{Estimator, EstimatorConfig, Policy, RunSummary};
pub use curation::{Curation, DocumentRecord, PerformanceKind};
pub use dedup::DedupPolicy;
pub use error::{Error, Result};
pub use evidence::{Candidate, Evidence, EvidenceWindow};
pub use labelling::{LabellingFunction, Runner, SourceDocument};
pub use schema::{ABSTAIN, Schema, VariableKind};
pub use store::EvidenceStore;
