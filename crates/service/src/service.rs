//! Construction of the DLC service from one configuration.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use dlchub_deploy::{ConfigField, DeployError, DeployMethod, Deployer, SettingsMap};
use dlchub_lookup::LookupService;
use dlchub_publish::Publisher;
use dlchub_store::Stores;
use dlchub_upload::{upload_channel_with, UploadEngine, UploadFrame};

use crate::config::ServiceConfig;

/// All service components wired over shared stores.
pub struct DlcService {
    pub stores: Stores,
    pub uploads: UploadEngine,
    pub publisher: Publisher,
    pub lookup: LookupService,
    config: ServiceConfig,
}

impl DlcService {
    pub fn new(config: ServiceConfig) -> Self {
        let stores = Stores::open(&config.content_root);
        let uploads = UploadEngine::new(stores.bundles.clone(), stores.versions.clone());
        let publisher = Publisher::new(
            stores.versions.clone(),
            stores.bundles.clone(),
            stores.apps.clone(),
        );
        let lookup = LookupService::new(stores.app_versions.clone(), stores.bundles.clone());

        info!(content_root = %config.content_root, "DLC service ready");
        Self {
            stores,
            uploads,
            publisher,
            lookup,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Creates an upload channel with the configured depth.
    pub fn upload_channel(&self) -> (mpsc::Sender<UploadFrame>, mpsc::Receiver<UploadFrame>) {
        upload_channel_with(self.config.upload_queue_depth)
    }

    /// Stores deployment settings for an application after validating
    /// the method key against the registry. The settings blob itself is
    /// stored opaquely.
    pub fn update_deployment_settings(
        &self,
        gamespace_id: i64,
        app_id: &str,
        method: &str,
        data: SettingsMap,
    ) -> Result<(), DeployError> {
        if DeployMethod::get(method).is_none() {
            return Err(DeployError::UnknownMethod(method.to_string()));
        }
        self.stores.apps.update(gamespace_id, app_id, method, data);
        Ok(())
    }

    /// Declares the operator-editable fields of a deployment method,
    /// for settings surfaces.
    pub fn method_fields(method: &str) -> Result<Vec<ConfigField>, DeployError> {
        DeployMethod::get(method)
            .map(|m| m.fields())
            .ok_or_else(|| DeployError::UnknownMethod(method.to_string()))
    }
}
