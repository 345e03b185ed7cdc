//! elm-mirror core
//!
//! Archives the Elm package registry: enumerates every published package,
//! downloads per-version metadata, mirrors source repositories, and checks
//! each package still installs with the Elm CLI.
//!
//! # Architecture
//!
//! ```text
//! Registry (package.elm-lang.org)
//!     │
//!     ├── search.json                      ← every package
//!     └── packages/<name>/releases.json    ← every version
//!            │
//!            ▼
//!     Pipeline ──► ArtifactStore ──► <root>/packages/<name>/<version>/*
//!              ──► SourceMirror  ──► <root>/packages/<name>/<name~>.git
//!              ──► InstallRunner ──► <root>/packages/<name>/@install (removed after)
//! ```

pub mod aggregate;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod fetch;
pub mod install;
pub mod mirror;
pub mod outcome;
pub mod pipeline;
pub mod process;
pub mod registry;
pub mod store;

pub use config::MirrorConfig;
pub use error::OperationError;
pub use outcome::{Outcome, RunReport, Status, Step};
pub use pipeline::{Pipeline, RunOptions};
pub use registry::{PackageSummary, RegistryClient};
pub use store::ArtifactStore;
