//! Fleet agent library: the host info endpoint, its collectors and the
//! agent configuration. The `fleet-agent` binary serves `api::build_router`.

pub mod api;
pub mod config;
pub mod metrics;
