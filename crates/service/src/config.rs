//! Service configuration, stored as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use dlchub_deploy::SettingsMap;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding uploaded bundle content.
    #[serde(default = "default_content_root")]
    pub content_root: String,

    /// Directory the runtime host serves for the local delivery backend.
    #[serde(default = "default_serving_root")]
    pub serving_root: String,

    /// Public URL prefix under which `serving_root` is reachable.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Depth of the bounded upload hand-off channel.
    #[serde(default = "default_upload_queue_depth")]
    pub upload_queue_depth: usize,
}

fn default_content_root() -> String {
    "/var/lib/dlchub/content".to_string()
}

fn default_serving_root() -> String {
    "/var/lib/dlchub/www".to_string()
}

fn default_public_url() -> String {
    "http://localhost:10600/download".to_string()
}

fn default_upload_queue_depth() -> usize {
    dlchub_upload::UPLOAD_QUEUE_DEPTH
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
            serving_root: default_serving_root(),
            public_url: default_public_url(),
            upload_queue_depth: default_upload_queue_depth(),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from `path`, writing defaults there first if
    /// the file does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ServiceConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = ServiceConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Settings blob for the local delivery backend, derived from the
    /// serving directory and public URL configured here.
    pub fn local_settings(&self) -> SettingsMap {
        let mut settings = SettingsMap::new();
        settings.insert("root".into(), self.serving_root.clone());
        settings.insert("url".into(), self.public_url.clone());
        settings
    }
}
