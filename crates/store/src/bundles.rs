//! Bundle store — bundle records plus their content files on disk.
//!
//! Content is addressed as `{content_root}/{app_id}/{data_id}/{bundle_id}`;
//! the bundle id doubles as the stable content key used by deployment.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{Bundle, BundleStatus};
use crate::Tables;

/// Owns bundle records and their content bytes.
pub struct BundleStore {
    content_root: PathBuf,
    tables: Arc<RwLock<Tables>>,
}

impl BundleStore {
    pub(crate) fn new(content_root: PathBuf, tables: Arc<RwLock<Tables>>) -> Self {
        Self {
            content_root,
            tables,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Directory holding all content files of one data version.
    pub fn content_dir(&self, app_id: &str, data_id: i64) -> PathBuf {
        self.content_root.join(app_id).join(data_id.to_string())
    }

    /// On-disk location of one bundle's content.
    pub fn content_path(&self, app_id: &str, data_id: i64, bundle_id: i64) -> PathBuf {
        self.content_dir(app_id, data_id).join(bundle_id.to_string())
    }

    /// Creates an empty bundle record in `CREATED`.
    ///
    /// Fails with [`StoreError::DuplicateName`] if the data version already
    /// contains a bundle with this name, and with
    /// [`StoreError::PublishedImmutable`] if the version is published.
    pub fn create(&self, gamespace_id: i64, data_id: i64, name: &str) -> Result<i64, StoreError> {
        let mut tables = self.write();
        tables.mutable_version(gamespace_id, data_id)?;

        let taken = tables.bundles.values().any(|b| {
            b.gamespace_id == gamespace_id && b.data_id == data_id && b.name == name
        });
        if taken {
            return Err(StoreError::DuplicateName(name.to_string()));
        }

        tables.next_bundle_id += 1;
        let bundle_id = tables.next_bundle_id;
        tables.bundles.insert(
            bundle_id,
            Bundle {
                bundle_id,
                data_id,
                gamespace_id,
                name: name.to_string(),
                status: BundleStatus::Created,
                hash: None,
                size: None,
                url: None,
                payload: serde_json::Value::Null,
                created_at: Utc::now(),
            },
        );

        info!(bundle_id, data_id, name, "bundle created");
        Ok(bundle_id)
    }

    pub fn get(&self, gamespace_id: i64, bundle_id: i64) -> Result<Bundle, StoreError> {
        self.read()
            .bundles
            .get(&bundle_id)
            .filter(|b| b.gamespace_id == gamespace_id)
            .cloned()
            .ok_or(StoreError::NoSuchBundle(bundle_id))
    }

    /// Resolves a bundle by name within a data version.
    pub fn find(&self, gamespace_id: i64, data_id: i64, name: &str) -> Option<Bundle> {
        self.read()
            .bundles
            .values()
            .find(|b| b.gamespace_id == gamespace_id && b.data_id == data_id && b.name == name)
            .cloned()
    }

    /// All bundles of a data version, newest first.
    pub fn list(&self, gamespace_id: i64, data_id: i64) -> Vec<Bundle> {
        let tables = self.read();
        let mut bundles: Vec<Bundle> = tables
            .bundles
            .values()
            .filter(|b| b.gamespace_id == gamespace_id && b.data_id == data_id)
            .cloned()
            .collect();
        bundles.sort_by_key(|b| std::cmp::Reverse(b.bundle_id));
        bundles
    }

    /// Records the final hash and size of an upload and advances the
    /// bundle to `UPLOADED`.
    ///
    /// This is the only call that makes new content visible to readers;
    /// the upload engine invokes it exactly once, after end-of-stream.
    pub fn update_content(
        &self,
        gamespace_id: i64,
        bundle_id: i64,
        hash: &str,
        size: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        let data_id = tables
            .bundles
            .get(&bundle_id)
            .filter(|b| b.gamespace_id == gamespace_id)
            .ok_or(StoreError::NoSuchBundle(bundle_id))?
            .data_id;
        tables.mutable_version(gamespace_id, data_id)?;

        let bundle = tables
            .bundles
            .get_mut(&bundle_id)
            .ok_or(StoreError::NoSuchBundle(bundle_id))?;
        bundle.hash = Some(hash.to_string());
        bundle.size = Some(size);
        bundle.status = BundleStatus::Uploaded;
        info!(bundle_id, hash, size, "bundle content updated");
        Ok(())
    }

    pub fn update_status(
        &self,
        gamespace_id: i64,
        bundle_id: i64,
        status: BundleStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        let bundle = tables
            .bundles
            .get_mut(&bundle_id)
            .filter(|b| b.gamespace_id == gamespace_id)
            .ok_or(StoreError::NoSuchBundle(bundle_id))?;
        debug!(bundle_id, from = %bundle.status, to = %status, "bundle status");
        bundle.status = status;
        Ok(())
    }

    /// Records a delivery outcome: the new status plus the public URL.
    pub fn update_delivery(
        &self,
        gamespace_id: i64,
        bundle_id: i64,
        status: BundleStatus,
        url: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        let bundle = tables
            .bundles
            .get_mut(&bundle_id)
            .filter(|b| b.gamespace_id == gamespace_id)
            .ok_or(StoreError::NoSuchBundle(bundle_id))?;
        bundle.status = status;
        bundle.url = Some(url.to_string());
        info!(bundle_id, %status, url, "bundle delivery updated");
        Ok(())
    }

    /// Attaches opaque metadata that lookup filters match against.
    pub fn set_payload(
        &self,
        gamespace_id: i64,
        bundle_id: i64,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        let data_id = tables
            .bundles
            .get(&bundle_id)
            .filter(|b| b.gamespace_id == gamespace_id)
            .ok_or(StoreError::NoSuchBundle(bundle_id))?
            .data_id;
        tables.mutable_version(gamespace_id, data_id)?;

        let bundle = tables
            .bundles
            .get_mut(&bundle_id)
            .ok_or(StoreError::NoSuchBundle(bundle_id))?;
        bundle.payload = payload;
        Ok(())
    }

    /// Deletes a bundle: best-effort content file removal, then the record.
    ///
    /// A missing content file is tolerated — the desired end state (no
    /// content) already holds. Record removal failures are not.
    pub async fn delete(
        &self,
        gamespace_id: i64,
        app_id: &str,
        bundle_id: i64,
    ) -> Result<(), StoreError> {
        let data_id = {
            let tables = self.read();
            let bundle = tables
                .bundles
                .get(&bundle_id)
                .filter(|b| b.gamespace_id == gamespace_id)
                .ok_or(StoreError::NoSuchBundle(bundle_id))?;
            tables.mutable_version(gamespace_id, bundle.data_id)?;
            bundle.data_id
        };

        let content = self.content_path(app_id, data_id, bundle_id);
        match tokio::fs::remove_file(&content).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(bundle_id, path = %content.display(), "no content file to remove");
            }
            Err(e) => return Err(e.into()),
        }

        self.write().bundles.remove(&bundle_id);
        info!(bundle_id, data_id, "bundle deleted");
        Ok(())
    }
}
