//! Kubernetes controllers for the DNS CRD
//!
//! This module contains the controller that watches DNS resources and
//! triggers reconciliation.

mod dns_controller;

pub use dns_controller::run as run_dns_controller;
pub use dns_controller::FINALIZER_NAME;

use std::sync::Arc;

use kube::Client;

use crate::adapters::RouterSettings;
use crate::router::StaticDnsApi;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Router static DNS API
    pub router: Arc<dyn StaticDnsApi>,
    /// Router settings resolved at startup
    pub settings: RouterSettings,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, router: Arc<dyn StaticDnsApi>, settings: RouterSettings) -> Self {
        Self {
            client,
            router,
            settings,
        }
    }
}
