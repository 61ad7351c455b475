//! CRD registration at operator startup

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{api::PostParams, Api, Client, CustomResourceExt};
use tracing::info;

use crate::error::{Error, Result};

use super::DNS;

/// Whether the DNS CRD had to be created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrdRegistration {
    Created,
    AlreadyExists,
}

/// Register the DNS CRD if the cluster does not have it yet.
///
/// A conflict (409) means the CRD is already installed and counts as success.
/// Any other API error is returned and should abort startup.
pub async fn ensure_crd(client: Client) -> Result<CrdRegistration> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);

    match crds.create(&PostParams::default(), &DNS::crd()).await {
        Ok(_) => {
            info!(crd = %DNS::crd_name(), "Registered CRD");
            Ok(CrdRegistration::Created)
        }
        Err(kube::Error::Api(err)) if err.code == 409 => {
            info!(crd = %DNS::crd_name(), "CRD already exists");
            Ok(CrdRegistration::AlreadyExists)
        }
        Err(e) => Err(Error::bootstrap(format!(
            "Failed to register CRD {}: {}",
            DNS::crd_name(),
            e
        ))),
    }
}
