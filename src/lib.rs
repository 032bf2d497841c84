//! # Idea Pipeline
//!
//! Submit short startup ideas, score them with an external reasoning
//! service, and serve the results.
//!
//! Submissions are fingerprinted by their normalized text. A fingerprint
//! analyzed in the last 72 hours is answered from the cache on the spot;
//! anything else is rate limited per owner, stored as `queued`, and handed
//! to a queue consumer that calls the analysis service, scores the rubric,
//! and records the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────┐   ┌────────────┐
//! │ POST idea  │──▶│ Dispatcher │──▶│  Queue   │──▶│   Worker   │
//! └────────────┘   └─────┬──────┘   └──────────┘   └─────┬──────┘
//!                        │ cache hit                     │ analyze + score
//!                        ▼                               ▼
//!                  ┌───────────────────────────────────────────┐
//!                  │  SQLite: ideas · idea_cache · submissions │
//!                  └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ideas init                    # create database
//! ideas serve                   # HTTP API + embedded worker
//! ideas worker                  # standalone consumer
//! ideas leaderboard --limit 10
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the `Store` trait |
//! | [`error`] | Submission and analysis error kinds |
//! | [`cache`] | Content-addressed analysis cache |
//! | [`gate`] | Per-owner submission quota |
//! | [`analysis`] | External analysis client |
//! | [`verify`] | Anti-abuse token verification |
//! | [`auth`] | Session cookie lookup |
//! | [`queue`] | At-least-once job queue |
//! | [`dispatch`] | Submission intake |
//! | [`worker`] | Queue consumer |
//! | [`views`] | Read paths and CLI output |
//! | [`server`] | HTTP API |

pub mod analysis;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod migrate;
pub mod queue;
pub mod server;
pub mod sqlite_store;
pub mod verify;
pub mod views;
pub mod worker;
