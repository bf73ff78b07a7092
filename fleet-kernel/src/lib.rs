//! Fleet kernel: host inventory, SSH key provisioning and agent telemetry.
//!
//! `HostService` is the entry point; the other modules are the pieces it is
//! assembled from and can be driven on their own.

pub mod config;
pub mod error;
pub mod http;
pub mod inventory;
pub mod keys;
pub mod lifecycle;
pub mod models;
pub mod provision;
pub mod query;
pub mod service;
pub mod ssh;
pub mod telemetry;
pub mod validate;

pub use error::{FleetError, ResultCode};
pub use service::HostService;
