//! Ecomine - sliding-window predictor mining over software ecosystems.
//!
//! This library computes behavioral features over chronological streams
//! of closed pull requests and issues, scoring every pull request
//! against the state of a sliding time window at the moment it closed.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          Ecomine                           │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌─────────┐  │
//! │  │ Dataset  │──▶│  Chunks  │──▶│  Window  │──▶│Features │  │
//! │  │ (merge)  │   │ (workers)│   │ (prune)  │   │ (score) │  │
//! │  └──────────┘   └──────────┘   └──────────┘   └─────────┘  │
//! │        │                            │              │       │
//! │        ▼                            ▼              ▼       │
//! │  ┌──────────┐                ┌──────────┐   ┌─────────┐    │
//! │  │   Deps   │                │  Graph   │   │   CSV   │    │
//! │  │  (map)   │                │ (collab) │   │ (rows)  │    │
//! │  └──────────┘                └──────────┘   └─────────┘    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events enter strictly ordered by closing timestamp; each one first
//! evicts everything beyond the window, is then scored (pull requests
//! only), and only afterwards joins the window itself. Chunked parallel
//! runs warm-start each worker with the previous chunk and produce the
//! same rows as a single-pass run.

pub mod chunks;
pub mod config;
pub mod dataset;
pub mod deps;
pub mod features;
pub mod model;
pub mod window;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use dataset::{ChronologicalMerge, DatasetError, EventReader};
pub use deps::{DependencyMap, DepsError, ProjectFilter, ProjectScope};
pub use features::{Feature, FeatureFactory, FeatureSet, FeatureValue, SlidingWindowFeature};
pub use model::{Actor, Comment, Event, EventKind};
pub use window::WindowManager;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
