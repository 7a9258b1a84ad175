//! Trigger surface and bounded worker pool.
//!
//! `GenerationService::trigger` validates ownership, allocates a version row,
//! and enqueues the job on a bounded channel; a fixed pool of workers drains
//! the channel and drives the orchestrator. A full queue is an immediate,
//! visible failure (the row is marked failed), never an unbounded backlog.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use siteforge_shared::{
    GenerationStatus, Result, SiteForgeError, VersionId, WebsiteId, WebsiteVersion,
};
use siteforge_storage::{NewVersion, Storage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, instrument};

use crate::orchestrator::GenerationOrchestrator;

/// Resolves the owning organization for a property.
#[async_trait::async_trait]
pub trait AccessControl: Send + Sync {
    /// `Ok(None)` means the property does not exist.
    async fn property_owner(&self, property_id: &str) -> Result<Option<String>>;
}

#[derive(Debug)]
pub struct TriggerRequest {
    pub property_id: String,
    pub organization_id: String,
    /// Free-form generation preferences, threaded into the pipeline context.
    pub preferences: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job_id: VersionId,
    pub website_id: WebsiteId,
    pub version: u32,
    pub status: GenerationStatus,
    pub estimated_time_seconds: u64,
}

/// Accepts generation triggers and runs them on a fixed worker pool.
pub struct GenerationService {
    storage: Arc<Storage>,
    access: Arc<dyn AccessControl>,
    sender: mpsc::Sender<VersionId>,
    estimated_time_seconds: u64,
}

impl GenerationService {
    /// Start the service with `workers` background workers pulling from a
    /// queue of at most `queue_capacity` pending jobs.
    pub fn new(
        storage: Arc<Storage>,
        orchestrator: Arc<GenerationOrchestrator>,
        access: Arc<dyn AccessControl>,
        workers: usize,
        queue_capacity: usize,
        estimated_time_seconds: u64,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<VersionId>(queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker in 0..workers {
            let receiver = receiver.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                loop {
                    // Hold the lock only for the recv so a long-running job
                    // never blocks the other workers from picking up.
                    let job = { receiver.lock().await.recv().await };
                    let Some(version_id) = job else { break };
                    info!(worker, version_id = %version_id, "picked up generation job");
                    if let Err(e) = orchestrator.run(&version_id).await {
                        error!(worker, version_id = %version_id, error = %e, "job aborted");
                    }
                }
            });
        }

        Self {
            storage,
            access,
            sender,
            estimated_time_seconds,
        }
    }

    /// Validate and enqueue a generation run for a property.
    ///
    /// Rejected when the property is unknown, owned by a different
    /// organization, already has a non-terminal version, or the queue is at
    /// capacity.
    #[instrument(skip(self), fields(property_id = %request.property_id))]
    pub async fn trigger(&self, request: TriggerRequest) -> Result<TriggerResponse> {
        if request.property_id.trim().is_empty() {
            return Err(SiteForgeError::validation("property_id must not be empty"));
        }

        let owner = self
            .access
            .property_owner(&request.property_id)
            .await?
            .ok_or_else(|| {
                SiteForgeError::not_found(format!("property {} not found", request.property_id))
            })?;
        if owner != request.organization_id {
            return Err(SiteForgeError::authorization(format!(
                "organization {} does not own property {}",
                request.organization_id, request.property_id
            )));
        }

        if self.storage.has_active_version(&request.property_id).await? {
            return Err(SiteForgeError::validation(format!(
                "a generation is already in progress for property {}",
                request.property_id
            )));
        }

        // Regenerations keep the stable website identity
        let website_id = match self.storage.latest_version(&request.property_id).await? {
            Some(previous) => previous.website_id,
            None => WebsiteId::new(),
        };

        let new = NewVersion {
            id: VersionId::new(),
            website_id,
            property_id: request.property_id.clone(),
        };
        let version = self.storage.create_version(&new).await?;

        if let Err(e) = self.sender.try_send(new.id.clone()) {
            let reason = match e {
                TrySendError::Full(_) => "generation backlog is full",
                TrySendError::Closed(_) => "generation workers are unavailable",
            };
            self.storage.mark_failed(&new.id, reason).await?;
            return Err(SiteForgeError::validation(reason));
        }

        info!(version, job_id = %new.id, "generation queued");
        Ok(TriggerResponse {
            job_id: new.id,
            website_id: new.website_id,
            version,
            status: GenerationStatus::Queued,
            estimated_time_seconds: self.estimated_time_seconds,
        })
    }

    /// Latest version row for a property, for status polling.
    pub async fn status(&self, property_id: &str) -> Result<WebsiteVersion> {
        self.storage
            .latest_version(property_id)
            .await?
            .ok_or_else(|| {
                SiteForgeError::not_found(format!("no generations found for property {property_id}"))
            })
    }
}
