//! Sync reporter: the entry point the scanner talks to.
//!
//! The reporter owns the session registry, the work queue and the worker pool.
//! Records are accepted fire-and-forget; per-record failures are logged and never
//! reach the caller. [`SyncReporter::finish`] is the only synchronous outcome: it
//! drains every accepted record, stops the workers and completes every session.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{PackageRecord, PackageSource};
use crate::pool::WorkerPool;
use crate::proto::{CompletionStatus, CreateToolSessionRequest, GitRef, ProjectSourceType};
use crate::queue::{QueueMetrics, WorkQueue};
use crate::registry::{Session, SessionRegistry};
use crate::service::{GrpcInsightService, InsightClient};

/// Publishes package insights to the aggregation service.
pub struct SyncReporter {
    config: SyncConfig,
    service: InsightClient,
    registry: Arc<SessionRegistry>,
    queue: Arc<WorkQueue>,
    pool: Mutex<Option<WorkerPool>>,
    session_init: Mutex<()>,
}

impl std::fmt::Debug for SyncReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReporter")
            .field("project_name", &self.config.project_name)
            .field("multi_project", &self.config.enable_multi_project_sync)
            .field("registry", &self.registry)
            .field("queue_capacity", &self.queue.capacity())
            .field("pending", &self.queue.pending())
            .finish_non_exhaustive()
    }
}

impl SyncReporter {
    /// Connects to the configured endpoint over gRPC and starts the reporter.
    ///
    /// # Errors
    /// Returns an error if the connection or the global session cannot be established.
    pub async fn connect(config: SyncConfig) -> Result<Self> {
        let service = GrpcInsightService::connect(&config).await?;
        Self::with_service(config, Arc::new(service)).await
    }

    /// Starts the reporter on top of an existing service client.
    ///
    /// In global mode the single session is created here. In multi-project mode
    /// sessions are created per manifest as manifests arrive.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the global session
    /// cannot be created.
    pub async fn with_service(config: SyncConfig, service: InsightClient) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SessionRegistry::new());
        if !config.enable_multi_project_sync {
            debug!(
                project_name = %config.project_name,
                project_version = %config.project_version,
                "Creating tool session"
            );
            let request = session_request(&config, &config.project_name)?;
            let session_id = service.create_session(request).await.map_err(|e| {
                SyncError::SessionCreationFailed {
                    project: config.project_name.clone(),
                    source: Box::new(e),
                }
            })?;
            info!(session_id = %session_id, "Tool data upload session created");
            registry.add_global(session_id, Arc::clone(&service)).await;
        }

        let queue = Arc::new(WorkQueue::new(config.queue_capacity));
        let pool = WorkerPool::start(
            config.effective_worker_count(),
            Arc::clone(&queue),
            Arc::clone(&registry),
        );

        Ok(Self {
            config,
            service,
            registry,
            queue,
            pool: Mutex::new(Some(pool)),
            session_init: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &'static str {
        "Cloud Sync Reporter"
    }

    /// Decomposes a manifest into package records and queues each of them.
    ///
    /// Entries that fail to decompose are logged and skipped. Returns the number of
    /// records accepted.
    pub async fn add_manifest(&self, source: &dyn PackageSource) -> usize {
        let manifest = source.manifest();

        if self.config.enable_multi_project_sync {
            self.ensure_manifest_session(&manifest.path, manifest.display_path()).await;
        }

        let mut accepted = 0;
        for record in source.records() {
            match record {
                Ok(record) => match self.submit(record).await {
                    Ok(()) => accepted += 1,
                    Err(e) => warn!(manifest = %manifest.path, error = %e, "Package not queued"),
                },
                Err(e) => warn!(manifest = %manifest.path, error = %e, "Failed to enumerate package"),
            }
        }

        debug!(manifest = %manifest.path, accepted = accepted, "Manifest queued for sync");
        accepted
    }

    /// Queues one record for publishing.
    ///
    /// # Errors
    /// Returns `SyncError::Closed` after [`finish`](Self::finish) has started.
    pub async fn submit(&self, record: PackageRecord) -> Result<()> {
        self.queue.submit(record).await
    }

    /// Drains all accepted records, stops the workers and completes every session.
    ///
    /// Every session gets a completion attempt; the first failure is returned.
    /// Calling `finish` again is a no-op; a call made while another is running
    /// waits for it to complete first.
    pub async fn finish(&self) -> Result<()> {
        let mut slot = self.pool.lock().await;
        let Some(pool) = slot.take() else {
            warn!("Sync reporter already finished");
            return Ok(());
        };

        self.queue.close();
        info!(pending = self.queue.pending(), "Waiting for pending insights to be published");
        self.queue.wait_drained().await;
        pool.shutdown().await;

        // A manifest session being created concurrently lands in the registry
        // before this lock is granted; later ones observe the closed queue.
        let mut sessions: Vec<Session> = Vec::new();
        {
            let _guard = self.session_init.lock().await;
            self.registry.for_each(|_, session| sessions.push(session.clone())).await;
        }

        let mut first_error = None;
        for session in sessions {
            debug!(session_id = %session.session_id(), "Completing tool session");

            if let Err(e) = session.client().complete_session(session.session_id(), CompletionStatus::Success).await {
                error!(session_id = %session.session_id(), error = %e, "Failed to complete tool session");
                first_error.get_or_insert(SyncError::SessionCompletionFailed {
                    session_id: session.session_id().to_string(),
                    source: Box::new(e),
                });
            }
        }

        let metrics = self.queue.metrics();
        info!(
            submitted = metrics.submitted,
            published = metrics.published,
            failed = metrics.failed,
            "Sync reporter finished"
        );

        first_error.map_or(Ok(()), Err)
    }

    /// Returns pipeline metrics.
    pub fn metrics(&self) -> QueueMetrics {
        self.queue.metrics()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Creates the keyed session for a manifest the first time it is seen.
    async fn ensure_manifest_session(&self, key: &str, project_name: &str) {
        let _guard = self.session_init.lock().await;
        if self.queue.is_closed() {
            debug!(manifest = %key, "Reporter finished, no session created");
            return;
        }
        if self.registry.contains(key).await {
            return;
        }

        let created = match session_request(&self.config, project_name) {
            Ok(request) => self.service.create_session(request).await,
            Err(e) => Err(e),
        };

        match created {
            Ok(session_id) => {
                info!(manifest = %key, session_id = %session_id, "Tool session created for manifest");
                self.registry.add_keyed(key, session_id, Arc::clone(&self.service)).await;
            }
            Err(e) => {
                error!(manifest = %key, error = %e, "Failed to create tool session for manifest");
            }
        }
    }
}

fn session_request(config: &SyncConfig, project_name: &str) -> Result<CreateToolSessionRequest> {
    let git_ref = if config.git_ref.is_some()
        || config.git_ref_name.is_some()
        || config.git_ref_type.is_some()
        || config.git_sha.is_some()
    {
        Some(GitRef {
            r#ref: config.git_ref.clone(),
            ref_name: config.git_ref_name.clone(),
            ref_type: config.git_ref_type.clone(),
            sha: config.git_sha.clone(),
        })
    } else {
        None
    };

    Ok(CreateToolSessionRequest {
        tool_name: config.tool_name.clone(),
        tool_version: config.tool_version.clone(),
        project_name: project_name.to_string(),
        project_version: Some(config.project_version.clone()),
        project_source: Some(ProjectSourceType::Unspecified as i32),
        trigger: Some(config.tool_trigger()? as i32),
        git_ref,
    })
}
