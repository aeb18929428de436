//! Local delivery: copy into a runtime-served directory tree.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tracing::info;

use crate::backend::{
    join_url, required, ConfigField, DeployTarget, Deployer, FieldKind, SettingsMap,
};
use crate::error::DeployError;

/// Copies bundle content into a directory served by the runtime host.
///
/// Layout mirrors the content store: `{root}/{app_id}/{data_id}/{key}`,
/// with the public URL formed the same way under the configured base.
#[derive(Debug, Default, Clone)]
pub struct LocalDeployer {
    root: String,
    url: String,
}

impl LocalDeployer {
    pub const KEY: &'static str = "local";
}

impl Deployer for LocalDeployer {
    fn configure(&mut self, settings: &SettingsMap) -> Result<(), DeployError> {
        self.root = required(settings, "root")?;
        self.url = required(settings, "url")?;
        Ok(())
    }

    fn serialize(&self) -> SettingsMap {
        let mut settings = SettingsMap::new();
        settings.insert("root".into(), self.root.clone());
        settings.insert("url".into(), self.url.clone());
        settings
    }

    fn fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                key: "root",
                title: "Serving directory",
                kind: FieldKind::Path,
                required: true,
            },
            ConfigField {
                key: "url",
                title: "Public base URL",
                kind: FieldKind::Url,
                required: true,
            },
        ]
    }

    fn apply_settings(&mut self, patch: &SettingsMap) {
        if let Some(v) = patch.get("root") {
            self.root = v.clone();
        }
        if let Some(v) = patch.get("url") {
            self.url = v.clone();
        }
    }

    fn deploy<'a>(
        &'a self,
        target: &'a DeployTarget,
        content: &'a Path,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, DeployError>> + Send + 'a>> {
        Box::pin(async move {
            let data_dir = target.data_id.to_string();
            let dir = Path::new(&self.root).join(&target.app_id).join(&data_dir);
            tokio::fs::create_dir_all(&dir).await?;

            let dest = dir.join(key);
            tokio::fs::copy(content, &dest).await?;

            let url = join_url(&self.url, &[&target.app_id, &data_dir, key]);
            info!(app_id = %target.app_id, data_id = target.data_id, key, %url, "bundle copied to serving directory");
            Ok(url)
        })
    }
}
