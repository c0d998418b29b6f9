//! # vend - Git-sourced dependency manager
//!
//! vend keeps three things in agreement: the dependencies a project declares
//! in `vend.json`, the exact commits recorded in `vend.lock`, and the working
//! copies checked out under `deps/`.
//!
//! ## Quick Start
//!
//! ```bash
//! vend add acme/widgets@v1.2.0
//! vend install --frozen
//! vend update --dry-run
//! ```
//!
//! ## Module Organization
//!
//! - [`specifier`] - Parsing of dependency specifiers
//! - [`config`] - Project layout and the `vend.json` manifest
//! - [`lock`] - The `vend.lock` lockfile
//! - [`vcs`] - Git access behind the [`vcs::SourceControl`] trait
//! - [`deps`] - Fetching and reconciliation

/// Project layout and manifest (`vend.json`).
pub mod config;

/// Dependency fetching and reconciliation.
pub mod deps;

/// Error types shared by every command.
pub mod error;

/// Lockfile (`vend.lock`) management.
pub mod lock;

/// Dependency specifier parsing.
pub mod specifier;

/// Terminal UI utilities (tables).
pub mod ui;

/// Atomic file writes.
pub mod utils;

/// Version control access.
pub mod vcs;

pub use error::{Error, Result};
