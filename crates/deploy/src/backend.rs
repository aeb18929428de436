//! The deployment capability interface and the backend registry.
//!
//! Backends are a closed set of tagged variants behind one trait: the
//! registry maps a stored method key to a constructor, resolved by
//! matching, not reflection. Adding a backend means adding a variant.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::Serialize;

use crate::error::DeployError;
use crate::local::LocalDeployer;
use crate::rsync::RsyncDeployer;

/// The opaque settings blob stored per application.
pub type SettingsMap = HashMap<String, String>;

/// Which data version a bundle is being delivered for.
#[derive(Debug, Clone)]
pub struct DeployTarget {
    pub gamespace_id: i64,
    pub app_id: String,
    pub data_id: i64,
}

/// Display hint for a configurable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Path,
    Url,
    /// Rendered masked; never echoed back to the operator.
    Secret,
}

/// One operator-editable setting of a backend.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub title: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// A delivery backend.
///
/// `configure`/`serialize` are inverses over the stored settings blob;
/// `deploy` moves one bundle's content to its public location and returns
/// the URL clients will download it from. Deploy calls may block on file
/// or subprocess I/O, so implementations run that work on the runtime's
/// blocking-capable pools.
pub trait Deployer: Send + Sync {
    /// Hydrates backend state from a stored settings blob. Idempotent;
    /// no side effects beyond the backend's own fields.
    fn configure(&mut self, settings: &SettingsMap) -> Result<(), DeployError>;

    /// Inverse of [`configure`](Self::configure).
    fn serialize(&self) -> SettingsMap;

    /// Declares the settings an operator may edit.
    fn fields(&self) -> Vec<ConfigField>;

    /// Merges operator-supplied edits into backend state. Unknown keys
    /// are ignored.
    fn apply_settings(&mut self, patch: &SettingsMap);

    /// Transfers one bundle's content and returns its public URL.
    ///
    /// `key` is the bundle's stable content key; it must produce the same
    /// remote location on every retry.
    fn deploy<'a>(
        &'a self,
        target: &'a DeployTarget,
        content: &'a Path,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, DeployError>> + Send + 'a>>;
}

/// The closed set of delivery backends.
pub enum DeployMethod {
    Local(LocalDeployer),
    RemoteSync(RsyncDeployer),
}

impl DeployMethod {
    /// Every method key the registry knows.
    pub const KEYS: &'static [&'static str] = &[LocalDeployer::KEY, RsyncDeployer::KEY];

    /// Resolves a stored method key to a fresh, unconfigured backend.
    pub fn get(key: &str) -> Option<DeployMethod> {
        match key {
            LocalDeployer::KEY => Some(DeployMethod::Local(LocalDeployer::default())),
            RsyncDeployer::KEY => Some(DeployMethod::RemoteSync(RsyncDeployer::default())),
            _ => None,
        }
    }

    /// The registry key of this backend.
    pub fn key(&self) -> &'static str {
        match self {
            DeployMethod::Local(_) => LocalDeployer::KEY,
            DeployMethod::RemoteSync(_) => RsyncDeployer::KEY,
        }
    }

    fn inner(&self) -> &dyn Deployer {
        match self {
            DeployMethod::Local(d) => d,
            DeployMethod::RemoteSync(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Deployer {
        match self {
            DeployMethod::Local(d) => d,
            DeployMethod::RemoteSync(d) => d,
        }
    }
}

impl Deployer for DeployMethod {
    fn configure(&mut self, settings: &SettingsMap) -> Result<(), DeployError> {
        self.inner_mut().configure(settings)
    }

    fn serialize(&self) -> SettingsMap {
        self.inner().serialize()
    }

    fn fields(&self) -> Vec<ConfigField> {
        self.inner().fields()
    }

    fn apply_settings(&mut self, patch: &SettingsMap) {
        self.inner_mut().apply_settings(patch)
    }

    fn deploy<'a>(
        &'a self,
        target: &'a DeployTarget,
        content: &'a Path,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, DeployError>> + Send + 'a>> {
        self.inner().deploy(target, content, key)
    }
}

/// Fetches a required, non-empty setting.
pub(crate) fn required(settings: &SettingsMap, key: &'static str) -> Result<String, DeployError> {
    settings
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(DeployError::MissingSetting(key))
}

/// Joins URL segments onto a base, normalizing slashes.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_keys() {
        assert!(matches!(
            DeployMethod::get("local"),
            Some(DeployMethod::Local(_))
        ));
        assert!(matches!(
            DeployMethod::get("rsync"),
            Some(DeployMethod::RemoteSync(_))
        ));
        assert!(DeployMethod::get("ftp").is_none());
    }

    #[test]
    fn registry_keys_roundtrip() {
        for key in DeployMethod::KEYS {
            let method = DeployMethod::get(key).unwrap();
            assert_eq!(method.key(), *key);
        }
    }

    #[test]
    fn join_url_normalizes() {
        assert_eq!(join_url("http://cdn/", &["a", "1"]), "http://cdn/a/1");
        assert_eq!(join_url("http://cdn", &["a", "1"]), "http://cdn/a/1");
    }

    #[test]
    fn required_rejects_empty() {
        let mut settings = SettingsMap::new();
        settings.insert("root".into(), String::new());
        assert!(matches!(
            required(&settings, "root"),
            Err(DeployError::MissingSetting("root"))
        ));
        settings.insert("root".into(), "/srv".into());
        assert_eq!(required(&settings, "root").unwrap(), "/srv");
    }
}
