//! In-memory record stores backing the DLC service.
//!
//! Four stores share one table set behind a single lock: bundles, data
//! versions, application-version references, and per-application
//! deployment settings. Bundle content bytes live on disk under the
//! content root; everything else is a record.
//!
//! Critical sections never hold the lock across an await point — file
//! I/O always happens outside the lock.

mod apps;
mod bundles;
mod error;
mod types;
mod versions;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub use apps::{AppSettingsStore, AppVersionStore};
pub use bundles::BundleStore;
pub use error::StoreError;
pub use types::{AppVersion, Bundle, BundleStatus, DataVersion, DeploymentSettings, VersionStatus};
pub use versions::DataVersionStore;

/// Shared record tables. One lock guards all of them so cross-table
/// invariants (duplicate names, reference guards) are checked atomically.
#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) versions: HashMap<i64, DataVersion>,
    pub(crate) bundles: HashMap<i64, Bundle>,
    pub(crate) app_versions: Vec<AppVersion>,
    pub(crate) apps: HashMap<(i64, String), DeploymentSettings>,
    pub(crate) next_data_id: i64,
    pub(crate) next_bundle_id: i64,
}

impl Tables {
    /// Looks up a data version scoped by gamespace.
    pub(crate) fn version(
        &self,
        gamespace_id: i64,
        data_id: i64,
    ) -> Result<&DataVersion, StoreError> {
        self.versions
            .get(&data_id)
            .filter(|v| v.gamespace_id == gamespace_id)
            .ok_or(StoreError::NoSuchVersion(data_id))
    }

    /// Like [`version`](Self::version), but refuses published versions.
    pub(crate) fn mutable_version(
        &self,
        gamespace_id: i64,
        data_id: i64,
    ) -> Result<&DataVersion, StoreError> {
        let version = self.version(gamespace_id, data_id)?;
        if version.status == VersionStatus::Published {
            return Err(StoreError::PublishedImmutable(data_id));
        }
        Ok(version)
    }
}

/// All four stores wired over one shared table set.
#[derive(Clone)]
pub struct Stores {
    pub bundles: Arc<BundleStore>,
    pub versions: Arc<DataVersionStore>,
    pub app_versions: Arc<AppVersionStore>,
    pub apps: Arc<AppSettingsStore>,
}

impl Stores {
    /// Opens the stores with bundle content rooted at `content_root`.
    pub fn open(content_root: impl Into<PathBuf>) -> Self {
        let tables = Arc::new(RwLock::new(Tables::default()));
        let bundles = Arc::new(BundleStore::new(content_root.into(), tables.clone()));
        let versions = Arc::new(DataVersionStore::new(tables.clone(), bundles.clone()));
        let app_versions = Arc::new(AppVersionStore::new(tables.clone()));
        let apps = Arc::new(AppSettingsStore::new(tables));
        Self {
            bundles,
            versions,
            app_versions,
            apps,
        }
    }
}
