//! Publish orchestrator.
//!
//! Drives a data version through `CREATED/ERROR → PUBLISHING →
//! {PUBLISHED | ERROR}`. Preconditions are checked and `PUBLISHING` is
//! persisted on the caller's task; the per-bundle delivery loop then
//! runs as a detached background task whose outcome is observed only
//! through subsequent state reads.
//!
//! Bundles are delivered strictly one at a time, in the store's stable
//! enumeration order, so a failure has a single well-defined position:
//! everything before it is `DELIVERED`, the failing bundle is `ERROR`,
//! everything after it is untouched.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use dlchub_deploy::{DeployMethod, DeployTarget, Deployer};
use dlchub_store::{
    AppSettingsStore, Bundle, BundleStatus, BundleStore, DataVersionStore, StoreError,
    VersionStatus,
};

/// Errors reported synchronously by a publish request.
///
/// Everything that happens after `PUBLISHING` is persisted surfaces as
/// version/bundle state instead.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("data version {0} is already published")]
    AlreadyPublished(i64),

    #[error("data version {0} is already being published")]
    AlreadyPublishing(i64),

    #[error("data version {0} has no bundles to publish")]
    NoBundles(i64),

    #[error("bundle '{0}' is not uploaded yet")]
    BundleNotReady(String),

    #[error("no usable deployment method: {0}")]
    NoDeployment(String),
}

/// Orchestrates publishing of data versions.
pub struct Publisher {
    versions: Arc<DataVersionStore>,
    bundles: Arc<BundleStore>,
    apps: Arc<AppSettingsStore>,
}

impl Publisher {
    pub fn new(
        versions: Arc<DataVersionStore>,
        bundles: Arc<BundleStore>,
        apps: Arc<AppSettingsStore>,
    ) -> Self {
        Self {
            versions,
            bundles,
            apps,
        }
    }

    /// Publishes a data version with the application's configured
    /// deployment backend.
    pub fn publish(&self, gamespace_id: i64, data_id: i64) -> Result<(), PublishError> {
        let version = self.versions.get(gamespace_id, data_id)?;
        let deployer = self.resolve_deployer(gamespace_id, &version.app_id)?;
        self.publish_with(gamespace_id, data_id, Arc::new(deployer))
    }

    /// Publishes a data version with a caller-supplied backend.
    ///
    /// Checks all preconditions, persists `PUBLISHING`, and spawns the
    /// delivery task. Returns as soon as the task is queued; delivery
    /// outcomes appear only in the stores.
    pub fn publish_with(
        &self,
        gamespace_id: i64,
        data_id: i64,
        deployer: Arc<dyn Deployer>,
    ) -> Result<(), PublishError> {
        let version = self.versions.get(gamespace_id, data_id)?;
        match version.status {
            VersionStatus::Published => return Err(PublishError::AlreadyPublished(data_id)),
            VersionStatus::Publishing => return Err(PublishError::AlreadyPublishing(data_id)),
            VersionStatus::Created | VersionStatus::Error => {}
        }

        let queue = self.bundles.list(gamespace_id, data_id);
        if queue.is_empty() {
            return Err(PublishError::NoBundles(data_id));
        }
        for bundle in &queue {
            match bundle.status {
                BundleStatus::Uploaded | BundleStatus::Delivered | BundleStatus::Error => {}
                BundleStatus::Created | BundleStatus::Delivering => {
                    return Err(PublishError::BundleNotReady(bundle.name.clone()));
                }
            }
        }

        // Visible to readers before any delivery I/O starts.
        self.versions
            .update_status(gamespace_id, data_id, VersionStatus::Publishing, "")?;
        info!(data_id, bundles = queue.len(), "publishing data version");

        let run = PublishRun {
            versions: self.versions.clone(),
            bundles: self.bundles.clone(),
            deployer,
            target: DeployTarget {
                gamespace_id,
                app_id: version.app_id,
                data_id,
            },
            queue,
        };
        tokio::spawn(run.run());
        Ok(())
    }

    fn resolve_deployer(
        &self,
        gamespace_id: i64,
        app_id: &str,
    ) -> Result<DeployMethod, PublishError> {
        let settings = self.apps.get(gamespace_id, app_id).map_err(|_| {
            PublishError::NoDeployment(
                "select a deployment method in application settings first".to_string(),
            )
        })?;
        let mut method = DeployMethod::get(&settings.method).ok_or_else(|| {
            PublishError::NoDeployment(format!("unknown deployment method '{}'", settings.method))
        })?;
        method
            .configure(&settings.data)
            .map_err(|e| PublishError::NoDeployment(e.to_string()))?;
        Ok(method)
    }
}

/// The detached delivery task for one publish attempt.
struct PublishRun {
    versions: Arc<DataVersionStore>,
    bundles: Arc<BundleStore>,
    deployer: Arc<dyn Deployer>,
    target: DeployTarget,
    queue: Vec<Bundle>,
}

impl PublishRun {
    /// Runs delivery to completion and always writes a terminal version
    /// status, even if the loop body panics.
    async fn run(self) {
        let gamespace_id = self.target.gamespace_id;
        let data_id = self.target.data_id;

        let outcome = match AssertUnwindSafe(self.deliver_all()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err("publish task panicked".to_string()),
        };

        let write = match &outcome {
            Ok(()) => {
                info!(data_id, "data version published");
                self.versions
                    .update_status(gamespace_id, data_id, VersionStatus::Published, "")
            }
            Err(reason) => {
                warn!(data_id, reason, "publish failed");
                self.versions
                    .update_status(gamespace_id, data_id, VersionStatus::Error, reason)
            }
        };
        if let Err(e) = write {
            error!(data_id, error = %e, "failed to record terminal publish status");
        }
    }

    async fn deliver_all(&self) -> Result<(), String> {
        let gamespace_id = self.target.gamespace_id;

        for bundle in &self.queue {
            if bundle.status == BundleStatus::Delivered {
                // Idempotent re-publish: finished content is not re-sent.
                debug!(bundle_id = bundle.bundle_id, "bundle already delivered, skipping");
                continue;
            }

            self.bundles
                .update_status(gamespace_id, bundle.bundle_id, BundleStatus::Delivering)
                .map_err(|e| e.to_string())?;

            let content = self.bundles.content_path(
                &self.target.app_id,
                self.target.data_id,
                bundle.bundle_id,
            );
            match self
                .deployer
                .deploy(&self.target, &content, &bundle.key())
                .await
            {
                Ok(url) => {
                    self.bundles
                        .update_delivery(gamespace_id, bundle.bundle_id, BundleStatus::Delivered, &url)
                        .map_err(|e| e.to_string())?;
                }
                Err(e) => {
                    if let Err(update) = self.bundles.update_status(
                        gamespace_id,
                        bundle.bundle_id,
                        BundleStatus::Error,
                    ) {
                        error!(bundle_id = bundle.bundle_id, error = %update, "failed to record bundle error");
                    }
                    return Err(format!("bundle '{}': {e}", bundle.name));
                }
            }
        }
        Ok(())
    }
}
