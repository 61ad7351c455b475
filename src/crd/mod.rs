//! Custom Resource Definitions for the DNS operator

mod bootstrap;
mod dns;

pub use bootstrap::*;
pub use dns::*;

use kube::CustomResourceExt;

/// Generate the CRD YAML manifest
pub fn generate_crds() -> Vec<String> {
    vec![serde_yaml::to_string(&DNS::crd()).unwrap()]
}
