//! Application-level records: version labels and deployment settings.
//!
//! An application version maps a client-visible label ("1.0") to the data
//! version currently served to that label. Deployment settings carry the
//! method key plus an opaque settings blob consumed by the deploy crate.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::error::StoreError;
use crate::types::{AppVersion, DeploymentSettings};
use crate::Tables;

/// Maps `(application, label)` to the currently attached data version.
pub struct AppVersionStore {
    tables: Arc<RwLock<Tables>>,
}

impl AppVersionStore {
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Attaches a label to a data version, replacing any previous
    /// attachment of that label.
    ///
    /// The data version must exist in this gamespace and belong to the
    /// same application. Any status may be attached — the lookup path
    /// exposes only delivered bundles regardless.
    pub fn switch(
        &self,
        gamespace_id: i64,
        app_id: &str,
        label: &str,
        data_id: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        let version = tables.version(gamespace_id, data_id)?;
        if version.app_id != app_id {
            return Err(StoreError::WrongApplication(data_id));
        }

        if let Some(existing) = tables
            .app_versions
            .iter_mut()
            .find(|av| av.gamespace_id == gamespace_id && av.app_id == app_id && av.label == label)
        {
            existing.current_data_id = data_id;
        } else {
            tables.app_versions.push(AppVersion {
                gamespace_id,
                app_id: app_id.to_string(),
                label: label.to_string(),
                current_data_id: data_id,
            });
        }
        info!(app_id, label, data_id, "application version switched");
        Ok(())
    }

    /// Removes a label's attachment. Detaching an unknown label is a no-op.
    pub fn detach(&self, gamespace_id: i64, app_id: &str, label: &str) {
        self.write().app_versions.retain(|av| {
            !(av.gamespace_id == gamespace_id && av.app_id == app_id && av.label == label)
        });
        info!(app_id, label, "application version detached");
    }

    /// Resolves a label to its attached data version.
    pub fn find(&self, gamespace_id: i64, app_id: &str, label: &str) -> Option<i64> {
        self.read()
            .app_versions
            .iter()
            .find(|av| av.gamespace_id == gamespace_id && av.app_id == app_id && av.label == label)
            .map(|av| av.current_data_id)
    }

    /// All labels of an application.
    pub fn list(&self, gamespace_id: i64, app_id: &str) -> Vec<AppVersion> {
        self.read()
            .app_versions
            .iter()
            .filter(|av| av.gamespace_id == gamespace_id && av.app_id == app_id)
            .cloned()
            .collect()
    }

    /// Whether any label of the application points at this data version.
    pub fn references(&self, gamespace_id: i64, app_id: &str, data_id: i64) -> bool {
        self.read().app_versions.iter().any(|av| {
            av.gamespace_id == gamespace_id
                && av.app_id == app_id
                && av.current_data_id == data_id
        })
    }
}

/// Per-application deployment settings.
///
/// The settings blob is stored opaquely; validation of the method key
/// against the registry happens at the service boundary, and switching
/// methods neither migrates nor revalidates the previous blob.
pub struct AppSettingsStore {
    tables: Arc<RwLock<Tables>>,
}

impl AppSettingsStore {
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }

    pub fn get(&self, gamespace_id: i64, app_id: &str) -> Result<DeploymentSettings, StoreError> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .apps
            .get(&(gamespace_id, app_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NoSuchApplication(app_id.to_string()))
    }

    pub fn update(
        &self,
        gamespace_id: i64,
        app_id: &str,
        method: &str,
        data: HashMap<String, String>,
    ) {
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .apps
            .insert(
                (gamespace_id, app_id.to_string()),
                DeploymentSettings {
                    method: method.to_string(),
                    data,
                },
            );
        info!(app_id, method, "deployment settings updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stores;

    const GS: i64 = 1;

    fn stores() -> (tempfile::TempDir, Stores) {
        let dir = tempfile::tempdir().unwrap();
        let stores = Stores::open(dir.path());
        (dir, stores)
    }

    #[test]
    fn switch_and_find() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        s.app_versions.switch(GS, "game", "1.0", data_id).unwrap();

        assert_eq!(s.app_versions.find(GS, "game", "1.0"), Some(data_id));
        assert_eq!(s.app_versions.find(GS, "game", "2.0"), None);
        assert_eq!(s.app_versions.find(2, "game", "1.0"), None);
    }

    #[test]
    fn switch_replaces_attachment() {
        let (_dir, s) = stores();
        let v1 = s.versions.create(GS, "game");
        let v2 = s.versions.create(GS, "game");
        s.app_versions.switch(GS, "game", "1.0", v1).unwrap();
        s.app_versions.switch(GS, "game", "1.0", v2).unwrap();

        assert_eq!(s.app_versions.find(GS, "game", "1.0"), Some(v2));
        assert_eq!(s.app_versions.list(GS, "game").len(), 1);
        assert!(!s.app_versions.references(GS, "game", v1));
        assert!(s.app_versions.references(GS, "game", v2));
    }

    #[test]
    fn switch_rejects_unknown_version() {
        let (_dir, s) = stores();
        let result = s.app_versions.switch(GS, "game", "1.0", 99);
        assert!(matches!(result, Err(StoreError::NoSuchVersion(99))));
    }

    #[test]
    fn switch_rejects_foreign_version() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "other");
        let result = s.app_versions.switch(GS, "game", "1.0", data_id);
        assert!(matches!(result, Err(StoreError::WrongApplication(_))));
    }

    #[test]
    fn detach_clears_reference() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        s.app_versions.switch(GS, "game", "1.0", data_id).unwrap();
        s.app_versions.detach(GS, "game", "1.0");

        assert_eq!(s.app_versions.find(GS, "game", "1.0"), None);
        assert!(!s.app_versions.references(GS, "game", data_id));

        // Idempotent.
        s.app_versions.detach(GS, "game", "1.0");
    }

    #[test]
    fn settings_roundtrip() {
        let (_dir, s) = stores();
        assert!(matches!(
            s.apps.get(GS, "game"),
            Err(StoreError::NoSuchApplication(_))
        ));

        let mut data = HashMap::new();
        data.insert("root".to_string(), "/srv/dlc".to_string());
        s.apps.update(GS, "game", "local", data.clone());

        let settings = s.apps.get(GS, "game").unwrap();
        assert_eq!(settings.method, "local");
        assert_eq!(settings.data, data);
    }

    #[test]
    fn settings_switch_keeps_blob_opaque() {
        let (_dir, s) = stores();
        let mut data = HashMap::new();
        data.insert("host".to_string(), "user@cdn:/srv".to_string());
        s.apps.update(GS, "game", "rsync", data);

        // Switching methods replaces blindly; old keys are not migrated.
        s.apps.update(GS, "game", "local", HashMap::new());
        let settings = s.apps.get(GS, "game").unwrap();
        assert_eq!(settings.method, "local");
        assert!(settings.data.is_empty());
    }
}
