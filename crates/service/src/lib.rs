//! Service wiring for the DLC delivery components.
//!
//! Builds the stores, upload engine, publisher and lookup projection
//! from one [`ServiceConfig`]. The HTTP and admin surfaces sit on top of
//! this crate and are out of scope here.

mod config;
mod service;

pub use config::ServiceConfig;
pub use service::DlcService;
