//! # authorscope
//!
//! Estimates, per author, how likely a repository's commits were written with
//! AI assistance.
//!
//! Commits are listed from GitHub, each sampled commit's diff is condensed
//! into a bounded summary and scored 0-100 by a chat-completions model, and
//! the scores are averaged per author. Organization runs merge the
//! per-repository averages weighted by commit counts. Every run is appended
//! to a result store that doubles as history and an opt-in cache.
//!
//! ## Quick Start
//!
//! ```rust
//! use authorscope::analysis::UserScore;
//!
//! let score = UserScore::from_totals("alice", 240, 3);
//! assert_eq!(score.ai_percent, 80);
//! assert_eq!(score.human_percent, 20);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod rate_limit;
pub mod source;
pub mod store;
pub mod summary;

pub use crate::cli::Cli;

/// The current version of authorscope.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
