//! # Idea Pipeline Core
//!
//! Shared, I/O-free logic for Idea Pipeline: data models, text
//! normalization and fingerprinting, the scoring law, summary derivation,
//! viewer-dependent redaction, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything that talks to the outside world lives in the `idea-pipeline`
//! application crate.

pub mod models;
pub mod normalize;
pub mod sanitize;
pub mod scoring;
pub mod store;
pub mod summary;
