//! SIGNET Core — domain models, error taxonomy, and repository traits
//! shared across all crates.
//!
//! This crate holds the vocabulary of the CA lifecycle: CA entries with
//! their status and policy fields, certificate fingerprint bundles,
//! publish-queue tasks, audit events, and batch requests. It depends on
//! no storage engine; persistence is reached exclusively through the
//! traits in [`repository`].

pub mod error;
pub mod models;
pub mod repository;

pub use error::{SignetError, SignetResult};
