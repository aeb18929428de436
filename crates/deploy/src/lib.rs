//! Pluggable bundle delivery.
//!
//! One capability interface ([`Deployer`]), two backends: copying into a
//! locally served directory tree, and pushing to a remote host over an
//! rsync transport. The active backend per application is selected by a
//! method key resolved through the [`DeployMethod`] registry.

mod backend;
mod error;
mod local;
mod rsync;

pub use backend::{ConfigField, DeployMethod, DeployTarget, Deployer, FieldKind, SettingsMap};
pub use error::DeployError;
pub use local::LocalDeployer;
pub use rsync::RsyncDeployer;
