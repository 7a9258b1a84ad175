//! The generation orchestrator: a strictly sequential, checkpointed state
//! machine over one `WebsiteVersion` row.
//!
//! `queued(0) → analyzing_brand(10) → planning_architecture(30) →
//! generating_content(50) → preparing_assets(70) → ready_for_preview(100)`
//!
//! The *entering* status/progress/step is persisted before each stage body
//! runs, so a crash mid-stage leaves an inspectable checkpoint. A stage
//! failure persists `failed` plus the error message and stops; progress
//! stays frozen at the entering checkpoint and prior stages' persisted
//! outputs are not rolled back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use siteforge_assets::{AssetResolver, ImageLibrary};
use siteforge_shared::{
    Blueprint, GenerationStatus, Result, SiteArchitecture, SiteForgeError, VersionId,
    WebsiteVersion,
};
use siteforge_storage::Storage;
use tracing::{error, info, instrument, warn};

use crate::stages::{ArchitecturePlanner, ContentGenerator, ContextAssembler};

/// Timeout and retry policy for orchestrated external calls.
///
/// Transient failures (network, timeout) are retried up to
/// `transient_retries` times; malformed output is permanent and never
/// retried.
#[derive(Debug, Clone)]
pub struct StagePolicy {
    pub timeout: Duration,
    pub transient_retries: u32,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            transient_retries: 1,
        }
    }
}

/// Drives the stage sequence for one generation run.
pub struct GenerationOrchestrator {
    storage: Arc<Storage>,
    context: Arc<dyn ContextAssembler>,
    planner: Arc<dyn ArchitecturePlanner>,
    generator: Arc<dyn ContentGenerator>,
    images: Arc<dyn ImageLibrary>,
    policy: StagePolicy,
}

impl GenerationOrchestrator {
    pub fn new(
        storage: Arc<Storage>,
        context: Arc<dyn ContextAssembler>,
        planner: Arc<dyn ArchitecturePlanner>,
        generator: Arc<dyn ContentGenerator>,
        images: Arc<dyn ImageLibrary>,
        policy: StagePolicy,
    ) -> Self {
        Self {
            storage,
            context,
            planner,
            generator,
            images,
            policy,
        }
    }

    /// Run the full pipeline for a version row.
    ///
    /// Stage errors are captured in the persisted row, never returned: the
    /// trigger's response has long since gone out, and polling the row is
    /// the only way to observe a mid-pipeline failure. The returned error
    /// covers only the case where the row itself cannot be loaded.
    #[instrument(skip(self), fields(version_id = %version_id))]
    pub async fn run(&self, version_id: &VersionId) -> Result<()> {
        let row = self
            .storage
            .get_version(version_id)
            .await?
            .ok_or_else(|| {
                SiteForgeError::not_found(format!("website version {version_id} not found"))
            })?;

        match self.run_stages(&row).await {
            Ok(()) => {
                self.storage.mark_ready(version_id).await?;
                info!("generation complete, ready for preview");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                self.storage.mark_failed(version_id, &e.to_string()).await?;
                Ok(())
            }
        }
    }

    async fn run_stages(&self, row: &WebsiteVersion) -> Result<()> {
        let id = &row.id;

        self.storage
            .checkpoint(id, GenerationStatus::AnalyzingBrand)
            .await?;
        let context: Value = self
            .call_stage("context assembly", || {
                self.context.assemble(&row.property_id)
            })
            .await?;

        self.storage
            .checkpoint(id, GenerationStatus::PlanningArchitecture)
            .await?;
        let architecture: SiteArchitecture = self
            .call_stage("architecture planning", || self.planner.plan(&context))
            .await?;
        self.storage.set_architecture(id, &architecture).await?;

        self.storage
            .checkpoint(id, GenerationStatus::GeneratingContent)
            .await?;
        let blueprint: Blueprint = self
            .call_stage("content generation", || {
                self.generator.generate(&context, &architecture)
            })
            .await?;
        self.storage.set_pages(id, &blueprint).await?;

        self.storage
            .checkpoint(id, GenerationStatus::PreparingAssets)
            .await?;
        AssetResolver::new(&*self.images)
            .resolve(
                &self.storage,
                id,
                &row.website_id,
                &row.property_id,
                &blueprint,
            )
            .await?;

        Ok(())
    }

    /// Run one external call under the stage policy: an explicit timeout,
    /// plus a single bounded retry on transient failure.
    async fn call_stage<T, F, Fut>(&self, stage: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(SiteForgeError::Network(format!(
                    "{stage} timed out after {}s",
                    self.policy.timeout.as_secs()
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts <= self.policy.transient_retries => {
                    warn!(stage, attempt = attempts, error = %e, "transient failure, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use siteforge_assets::StoredImage;
    use siteforge_shared::{Page, Section, WebsiteId};
    use siteforge_storage::NewVersion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("sf_orch_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    async fn seeded_version(storage: &Storage) -> NewVersion {
        let new = NewVersion {
            id: VersionId::new(),
            website_id: WebsiteId::new(),
            property_id: "prop-1".into(),
        };
        storage.create_version(&new).await.expect("create version");
        new
    }

    // -- mocks ---------------------------------------------------------------

    struct StaticContext;

    #[async_trait]
    impl ContextAssembler for StaticContext {
        async fn assemble(&self, property_id: &str) -> Result<Value> {
            Ok(json!({"property_id": property_id, "brand": "Seaside Stays"}))
        }
    }

    /// Planner that asserts the entering checkpoint was persisted before the
    /// stage body runs, then returns a fixed architecture.
    struct ObservingPlanner {
        storage: Arc<Storage>,
        version_id: VersionId,
    }

    #[async_trait]
    impl ArchitecturePlanner for ObservingPlanner {
        async fn plan(&self, _context: &Value) -> Result<SiteArchitecture> {
            let row = self
                .storage
                .get_version(&self.version_id)
                .await?
                .expect("row exists");
            assert_eq!(row.status, GenerationStatus::PlanningArchitecture);
            assert_eq!(row.progress, 30);

            Ok(SiteArchitecture {
                pages: vec![siteforge_shared::types::PagePlan {
                    slug: "home".into(),
                    title: "Home".into(),
                    sections: vec!["hero-carousel".into(), "photo-grid".into()],
                }],
                design_notes: None,
            })
        }
    }

    struct FixedGenerator;

    #[async_trait]
    impl ContentGenerator for FixedGenerator {
        async fn generate(
            &self,
            _context: &Value,
            architecture: &SiteArchitecture,
        ) -> Result<Blueprint> {
            Ok(Blueprint {
                pages: architecture
                    .pages
                    .iter()
                    .map(|plan| Page {
                        slug: plan.slug.clone(),
                        title: plan.title.clone(),
                        sections: vec![
                            Section {
                                id: format!("sec-{}", Uuid::now_v7()),
                                section_type: "hero".into(),
                                block_ref: "hero-carousel".into(),
                                content: json!({"slides": [{"image_index": 3}]}),
                                variant: None,
                                css_classes: None,
                                order: 0,
                            },
                            Section {
                                id: format!("sec-{}", Uuid::now_v7()),
                                section_type: "gallery".into(),
                                block_ref: "photo-grid".into(),
                                content: json!({"image_indices": [3, 0]}),
                                variant: None,
                                css_classes: None,
                                order: 1,
                            },
                        ],
                    })
                    .collect(),
            })
        }
    }

    struct EmptyLibrary;

    #[async_trait]
    impl ImageLibrary for EmptyLibrary {
        async fn list_images(
            &self,
            _property_id: &str,
            _limit: usize,
        ) -> Result<Vec<StoredImage>> {
            Ok(Vec::new())
        }
    }

    struct FailingPlanner {
        error: fn() -> SiteForgeError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArchitecturePlanner for FailingPlanner {
        async fn plan(&self, _context: &Value) -> Result<SiteArchitecture> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    /// Fails transiently once, then succeeds.
    struct FlakyPlanner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArchitecturePlanner for FlakyPlanner {
        async fn plan(&self, _context: &Value) -> Result<SiteArchitecture> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SiteForgeError::Network("connection reset".into()));
            }
            Ok(SiteArchitecture {
                pages: vec![siteforge_shared::types::PagePlan {
                    slug: "home".into(),
                    title: "Home".into(),
                    sections: vec!["hero-carousel".into()],
                }],
                design_notes: None,
            })
        }
    }

    fn orchestrator(
        storage: Arc<Storage>,
        planner: Arc<dyn ArchitecturePlanner>,
    ) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            storage,
            Arc::new(StaticContext),
            planner,
            Arc::new(FixedGenerator),
            Arc::new(EmptyLibrary),
            StagePolicy::default(),
        )
    }

    #[tokio::test]
    async fn full_run_reaches_ready_for_preview() {
        let storage = test_storage().await;
        let new = seeded_version(&storage).await;

        let planner = Arc::new(ObservingPlanner {
            storage: storage.clone(),
            version_id: new.id.clone(),
        });
        orchestrator(storage.clone(), planner)
            .run(&new.id)
            .await
            .expect("run");

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::ReadyForPreview);
        assert_eq!(row.progress, 100);
        assert!(row.error_message.is_none());
        assert!(row.completed_at.is_some());

        // Both stage outputs persisted
        assert_eq!(row.architecture.unwrap().pages.len(), 1);
        let pages = row.pages_generated.expect("pages persisted");
        assert_eq!(pages.pages[0].sections.len(), 2);

        // Index 3 referenced twice across two shapes: exactly one asset row
        let assets = storage.list_assets(&new.id).await.unwrap();
        let indices: Vec<u32> = assets.iter().map(|a| a.image_index).collect();
        assert_eq!(indices, vec![0, 3]);
    }

    #[tokio::test]
    async fn planner_failure_freezes_progress_at_30() {
        let storage = test_storage().await;
        let new = seeded_version(&storage).await;

        let planner = Arc::new(FailingPlanner {
            error: || SiteForgeError::Generation("architecture payload contains no pages".into()),
            calls: AtomicUsize::new(0),
        });
        orchestrator(storage.clone(), planner.clone())
            .run(&new.id)
            .await
            .expect("run returns Ok; failure lives in the row");

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::Failed);
        assert_eq!(row.progress, 30);
        assert!(row.error_message.unwrap().contains("no pages"));
        assert!(row.pages_generated.is_none());

        // Malformed output is permanent: exactly one attempt
        assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let storage = test_storage().await;
        let new = seeded_version(&storage).await;

        let planner = Arc::new(FlakyPlanner {
            calls: AtomicUsize::new(0),
        });
        orchestrator(storage.clone(), planner.clone())
            .run(&new.id)
            .await
            .expect("run");

        assert_eq!(planner.calls.load(Ordering::SeqCst), 2);
        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::ReadyForPreview);
    }

    #[tokio::test]
    async fn repeated_transient_failure_gives_up() {
        let storage = test_storage().await;
        let new = seeded_version(&storage).await;

        let planner = Arc::new(FailingPlanner {
            error: || SiteForgeError::Network("connection reset".into()),
            calls: AtomicUsize::new(0),
        });
        orchestrator(storage.clone(), planner.clone())
            .run(&new.id)
            .await
            .expect("run");

        // Initial attempt plus one retry
        assert_eq!(planner.calls.load(Ordering::SeqCst), 2);
        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let storage = test_storage().await;
        let err = orchestrator(
            storage,
            Arc::new(FlakyPlanner {
                calls: AtomicUsize::new(0),
            }),
        )
        .run(&VersionId::new())
        .await
        .unwrap_err();
        assert!(matches!(err, SiteForgeError::NotFound { .. }));
    }
}
