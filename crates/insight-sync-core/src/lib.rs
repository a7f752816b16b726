//! Insight sync pipeline.
//!
//! Publishes per-package insights (dependencies, vulnerabilities, project
//! popularity, licenses) produced by a dependency scanner to a remote
//! aggregation service. Records flow through a bounded [`WorkQueue`] into a
//! [`WorkerPool`] that resolves the remote session for each record via the
//! [`SessionRegistry`], translates it and publishes it. [`SyncReporter`] ties
//! the pieces together and owns the drain-then-complete shutdown.

pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod proto;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod service;
pub mod translator;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use models::{
    Ecosystem, Manifest, ManifestPackage, ManifestRef, PackageInsights, PackageRecord, PackageRef,
    PackageSource, ProjectInfo, VulnerabilityInfo,
};
pub use pool::WorkerPool;
pub use queue::{QueueMetrics, Resolution, WorkQueue};
pub use registry::{GLOBAL_SESSION_KEY, Session, SessionRegistry};
pub use reporter::SyncReporter;
pub use service::{GrpcInsightService, InsightClient, InsightService};
