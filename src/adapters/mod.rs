//! Adapters between the operator's environment and the router client

mod router_config;

pub use router_config::*;
