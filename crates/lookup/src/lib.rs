//! Client-facing read projection.
//!
//! Resolves `(application, version label)` through the application-version
//! reference to the attached data version and projects its bundles as
//! `name → {hash, url, size}`. Only bundles in `DELIVERED` are ever
//! exposed — the guard is per bundle, independent of the data version's
//! own status.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use dlchub_store::{AppVersionStore, BundleStatus, BundleStore};

/// One delivered bundle as clients see it.
#[derive(Debug, Clone, Serialize)]
pub struct BundleEntry {
    pub hash: String,
    pub url: String,
    pub size: i64,
    /// Opaque metadata attached at upload time; omitted when null.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

/// The bundle directory served for one application version.
pub type BundleDirectory = BTreeMap<String, BundleEntry>;

/// Read-only resolution of application versions to delivered bundles.
pub struct LookupService {
    app_versions: Arc<AppVersionStore>,
    bundles: Arc<BundleStore>,
}

impl LookupService {
    pub fn new(app_versions: Arc<AppVersionStore>, bundles: Arc<BundleStore>) -> Self {
        Self {
            app_versions,
            bundles,
        }
    }

    /// Resolves a version label to its delivered bundles.
    ///
    /// Returns `None` when the label has no data version attached.
    /// `filters` are equality checks against keys of each bundle's
    /// payload object; a bundle without an object payload matches only
    /// when no filters are given.
    pub fn resolve(
        &self,
        gamespace_id: i64,
        app_id: &str,
        label: &str,
        filters: &HashMap<String, String>,
    ) -> Option<BundleDirectory> {
        let data_id = self.app_versions.find(gamespace_id, app_id, label)?;

        let mut directory = BundleDirectory::new();
        for bundle in self.bundles.list(gamespace_id, data_id) {
            if bundle.status != BundleStatus::Delivered {
                debug!(
                    bundle_id = bundle.bundle_id,
                    status = %bundle.status,
                    "bundle not delivered, hidden from lookup"
                );
                continue;
            }
            if !payload_matches(&bundle.payload, filters) {
                continue;
            }
            // Delivered bundles always carry content attributes; skip
            // defensively if a record is somehow incomplete.
            let (Some(hash), Some(size), Some(url)) = (bundle.hash, bundle.size, bundle.url)
            else {
                continue;
            };
            directory.insert(
                bundle.name,
                BundleEntry {
                    hash,
                    url,
                    size,
                    payload: bundle.payload,
                },
            );
        }
        Some(directory)
    }
}

/// Equality-matches filter parameters against a payload object.
fn payload_matches(payload: &serde_json::Value, filters: &HashMap<String, String>) -> bool {
    if filters.is_empty() {
        return true;
    }
    let Some(object) = payload.as_object() else {
        return false;
    };
    filters.iter().all(|(key, want)| {
        object.get(key).is_some_and(|value| match value {
            serde_json::Value::String(s) => s == want,
            other => other.to_string() == *want,
        })
    })
}
