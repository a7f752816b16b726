//! Error types for the insight sync pipeline.

use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync pipeline errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No session is registered for the routing key and no global session exists.
    #[error("session not found for key: {key}")]
    SessionNotFound {
        /// Routing key (manifest path) that failed to resolve
        key: String,
    },

    /// A sub-field of the insight could not be computed and was defaulted.
    #[error("translation degraded for {package}: {reason}")]
    TranslationDegraded {
        /// Package coordinates (ecosystem/name/version)
        package: String,
        /// What could not be computed
        reason: String,
    },

    /// Remote publish call failed.
    #[error("failed to publish package insight for {package}: {source}")]
    PublishFailed {
        /// Package coordinates (ecosystem/name/version)
        package: String,
        /// Underlying transport or RPC error
        #[source]
        source: Box<SyncError>,
    },

    /// Remote session creation failed.
    #[error("failed to create tool session for project {project}: {source}")]
    SessionCreationFailed {
        /// Project the session was requested for
        project: String,
        /// Underlying transport or RPC error
        #[source]
        source: Box<SyncError>,
    },

    /// Remote session completion failed.
    #[error("failed to complete tool session {session_id}: {source}")]
    SessionCompletionFailed {
        /// Session that could not be completed
        session_id: String,
        /// Underlying transport or RPC error
        #[source]
        source: Box<SyncError>,
    },

    /// The dependency list of a package cannot be computed.
    #[error("dependency graph not available for manifest: {0}")]
    DependenciesUnavailable(String),

    /// A manifest entry could not be turned into a package record.
    #[error("invalid package entry in {manifest}: {reason}")]
    InvalidPackage {
        /// Manifest path
        manifest: String,
        /// Reason the entry was rejected
        reason: String,
    },

    /// The reporter has finished and accepts no more work.
    #[error("reporter is closed")]
    Closed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status returned by the remote service
    #[error("RPC error: {0}")]
    Rpc(#[from] tonic::Status),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
