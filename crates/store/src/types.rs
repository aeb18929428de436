//! Record types for data versions, bundles and application references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a data version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Created,
    Publishing,
    Published,
    Error,
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VersionStatus::Created => "CREATED",
            VersionStatus::Publishing => "PUBLISHING",
            VersionStatus::Published => "PUBLISHED",
            VersionStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a bundle.
///
/// Advances `CREATED → UPLOADED → DELIVERING → {DELIVERED | ERROR}`.
/// A failed delivery may return to `DELIVERING` on retry; a re-upload
/// resets `UPLOADED`/`ERROR` back to `UPLOADED` with new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleStatus {
    Created,
    Uploaded,
    Delivering,
    Delivered,
    Error,
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BundleStatus::Created => "CREATED",
            BundleStatus::Uploaded => "UPLOADED",
            BundleStatus::Delivering => "DELIVERING",
            BundleStatus::Delivered => "DELIVERED",
            BundleStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One deployable snapshot of content for an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataVersion {
    pub data_id: i64,
    /// Application name this version belongs to.
    pub app_id: String,
    pub gamespace_id: i64,
    pub status: VersionStatus,
    /// Diagnostic text; empty unless the last publish attempt failed.
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A single named content blob within a data version.
///
/// `hash`, `size` and `url` stay `None` until the corresponding upload
/// and delivery steps complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_id: i64,
    pub data_id: i64,
    pub gamespace_id: i64,
    pub name: String,
    pub status: BundleStatus,
    /// Hex SHA-256 of the uploaded content.
    pub hash: Option<String>,
    pub size: Option<i64>,
    /// Public URL, set once the bundle has been delivered.
    pub url: Option<String>,
    /// Opaque client metadata, matched by lookup filters. Defaults to null.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Stable content key under the data version's directory.
    ///
    /// Must not change across delivery retries — clients cache the
    /// resulting URL.
    pub fn key(&self) -> String {
        self.bundle_id.to_string()
    }
}

/// A label within an application pointing at the data version currently
/// served to clients running that label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppVersion {
    pub gamespace_id: i64,
    pub app_id: String,
    pub label: String,
    pub current_data_id: i64,
}

/// Per-application deployment configuration: a method key from the
/// deployment registry plus the method-specific settings blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentSettings {
    pub method: String,
    pub data: std::collections::HashMap<String, String>,
}
