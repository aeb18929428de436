//! Data version store — version records and cascade deletion.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info};

use crate::bundles::BundleStore;
use crate::error::StoreError;
use crate::types::{DataVersion, VersionStatus};
use crate::Tables;

/// Owns data-version records. Deletion cascades through the bundle store.
pub struct DataVersionStore {
    tables: Arc<RwLock<Tables>>,
    bundles: Arc<BundleStore>,
}

impl DataVersionStore {
    pub(crate) fn new(tables: Arc<RwLock<Tables>>, bundles: Arc<BundleStore>) -> Self {
        Self { tables, bundles }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates an empty data version in `CREATED` and returns its id.
    pub fn create(&self, gamespace_id: i64, app_id: &str) -> i64 {
        let mut tables = self.write();
        tables.next_data_id += 1;
        let data_id = tables.next_data_id;
        tables.versions.insert(
            data_id,
            DataVersion {
                data_id,
                app_id: app_id.to_string(),
                gamespace_id,
                status: VersionStatus::Created,
                reason: String::new(),
                created_at: Utc::now(),
            },
        );
        info!(data_id, app_id, "data version created");
        data_id
    }

    pub fn get(&self, gamespace_id: i64, data_id: i64) -> Result<DataVersion, StoreError> {
        self.read().version(gamespace_id, data_id).cloned()
    }

    /// Data versions of an application, newest first. With
    /// `published_only`, only versions in `PUBLISHED`.
    pub fn list(&self, gamespace_id: i64, app_id: &str, published_only: bool) -> Vec<DataVersion> {
        let tables = self.read();
        let mut versions: Vec<DataVersion> = tables
            .versions
            .values()
            .filter(|v| v.gamespace_id == gamespace_id && v.app_id == app_id)
            .filter(|v| !published_only || v.status == VersionStatus::Published)
            .cloned()
            .collect();
        versions.sort_by_key(|v| std::cmp::Reverse(v.data_id));
        versions
    }

    pub fn update_status(
        &self,
        gamespace_id: i64,
        data_id: i64,
        status: VersionStatus,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.version(gamespace_id, data_id)?;
        let version = tables
            .versions
            .get_mut(&data_id)
            .ok_or(StoreError::NoSuchVersion(data_id))?;
        debug!(data_id, from = %version.status, to = %status, "version status");
        version.status = status;
        version.reason = reason.to_string();
        Ok(())
    }

    /// Deletes a data version and everything under it.
    ///
    /// Guard order matters: the application-version reference check and
    /// the published check both run before any destructive step, so a
    /// protected version is never left partially cascaded.
    pub async fn delete(&self, gamespace_id: i64, data_id: i64) -> Result<(), StoreError> {
        let (app_id, bundle_ids) = {
            let tables = self.read();
            let version = tables.version(gamespace_id, data_id)?;

            let referenced = tables.app_versions.iter().any(|av| {
                av.gamespace_id == gamespace_id
                    && av.app_id == version.app_id
                    && av.current_data_id == data_id
            });
            if referenced {
                return Err(StoreError::VersionInUse(data_id));
            }
            match version.status {
                VersionStatus::Published => {
                    return Err(StoreError::PublishedImmutable(data_id));
                }
                VersionStatus::Publishing => {
                    return Err(StoreError::PublishInProgress(data_id));
                }
                VersionStatus::Created | VersionStatus::Error => {}
            }

            let bundle_ids: Vec<i64> = tables
                .bundles
                .values()
                .filter(|b| b.gamespace_id == gamespace_id && b.data_id == data_id)
                .map(|b| b.bundle_id)
                .collect();
            (version.app_id.clone(), bundle_ids)
        };

        for bundle_id in bundle_ids {
            self.bundles.delete(gamespace_id, &app_id, bundle_id).await?;
        }

        self.write().versions.remove(&data_id);
        info!(data_id, app_id, "data version deleted");
        Ok(())
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
    fn create_starts_in_created() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        let version = s.versions.get(GS, data_id).unwrap();
        assert_eq!(version.status, VersionStatus::Created);
        assert_eq!(version.app_id, "game");
        assert!(version.reason.is_empty());
    }

    #[test]
    fn list_filters_published() {
        let (_dir, s) = stores();
        let v1 = s.versions.create(GS, "game");
        let v2 = s.versions.create(GS, "game");
        s.versions.create(GS, "other");
        s.versions
            .update_status(GS, v2, VersionStatus::Published, "")
            .unwrap();

        let all = s.versions.list(GS, "game", false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].data_id, v2); // newest first

        let published = s.versions.list(GS, "game", true);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].data_id, v2);
        let _ = v1;
    }

    #[test]
    fn update_status_records_reason() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        s.versions
            .update_status(GS, data_id, VersionStatus::Error, "bundle 'a' failed")
            .unwrap();
        let version = s.versions.get(GS, data_id).unwrap();
        assert_eq!(version.status, VersionStatus::Error);
        assert_eq!(version.reason, "bundle 'a' failed");
    }

    #[tokio::test]
    async fn delete_cascades_bundles() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        let b1 = s.bundles.create(GS, data_id, "a").unwrap();
        let b2 = s.bundles.create(GS, data_id, "b").unwrap();

        let path = s.bundles.content_path("game", data_id, b1);
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, b"bytes").await.unwrap();

        s.versions.delete(GS, data_id).await.unwrap();

        assert!(matches!(
            s.versions.get(GS, data_id),
            Err(StoreError::NoSuchVersion(_))
        ));
        assert!(matches!(
            s.bundles.get(GS, b1),
            Err(StoreError::NoSuchBundle(_))
        ));
        assert!(matches!(
            s.bundles.get(GS, b2),
            Err(StoreError::NoSuchBundle(_))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn delete_refused_while_referenced() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        let bundle_id = s.bundles.create(GS, data_id, "a").unwrap();
        s.app_versions.switch(GS, "game", "1.0", data_id).unwrap();

        let result = s.versions.delete(GS, data_id).await;
        assert!(matches!(result, Err(StoreError::VersionInUse(_))));

        // Nothing was cascaded.
        assert!(s.versions.get(GS, data_id).is_ok());
        assert!(s.bundles.get(GS, bundle_id).is_ok());
    }

    #[tokio::test]
    async fn delete_refused_when_published() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        let bundle_id = s.bundles.create(GS, data_id, "a").unwrap();
        s.versions
            .update_status(GS, data_id, VersionStatus::Published, "")
            .unwrap();

        let result = s.versions.delete(GS, data_id).await;
        assert!(matches!(result, Err(StoreError::PublishedImmutable(_))));
        assert!(s.versions.get(GS, data_id).is_ok());
        assert!(s.bundles.get(GS, bundle_id).is_ok());
    }

    #[tokio::test]
    async fn delete_refused_while_publishing() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        s.versions
            .update_status(GS, data_id, VersionStatus::Publishing, "")
            .unwrap();

        let result = s.versions.delete(GS, data_id).await;
        assert!(matches!(result, Err(StoreError::PublishInProgress(_))));
        assert!(s.versions.get(GS, data_id).is_ok());
    }

    #[tokio::test]
    async fn delete_allowed_from_error() {
        let (_dir, s) = stores();
        let data_id = s.versions.create(GS, "game");
        s.versions
            .update_status(GS, data_id, VersionStatus::Error, "deploy failed")
            .unwrap();

        s.versions.delete(GS, data_id).await.unwrap();
        assert!(s.versions.get(GS, data_id).is_err());
    }
}
