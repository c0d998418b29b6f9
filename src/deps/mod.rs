//! Dependency fetching and reconciliation.
//!
//! - **Fetching**: Materialize working copies under `deps/` from Git or a local path
//! - **Management**: Keep `vend.json`, `vend.lock` and `deps/` in agreement
//!
//! ## Commands
//!
//! - `vend add <spec>` - Declare and pin a dependency
//! - `vend remove <name>` - Remove a dependency
//! - `vend update` - Move pins to the latest commit of their followed ref
//! - `vend install` - Fetch everything the manifest declares

mod fetch;
mod manage;

pub use fetch::{Fetcher, InstallState};
pub use manage::{InstallOptions, InstallSummary, ListEntry, Reconciler, UpdateReport};
