//! DNS reconciler
//!
//! Drives the router's static DNS table from DNS resource lifecycle events:
//! - create: validate, list, guard against duplicates, register
//! - delete: validate, list, remove every entry carrying the name
//!
//! Both handlers re-read the router on every call and return a
//! [`ReconcileOutcome`] instead of an error, so the controller decides about
//! requeueing from the classification alone.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::adapters::{RouterConfig, RouterSettings};
use crate::crd::DnsSpec;
use crate::router::{find_by_name, matching_records, StaticDnsApi, TransportError};

/// Requeue delay for temporary failures
pub const TEMPORARY_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Result of a handler run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Router state matches the event, nothing left to do
    Success,
    /// Will not succeed without a change to the resource or the environment
    PermanentFailure(String),
    /// Expected to clear up, retry after `retry_after`
    TemporaryFailure { reason: String, retry_after: Duration },
}

impl ReconcileOutcome {
    pub fn permanent(reason: impl Into<String>) -> Self {
        ReconcileOutcome::PermanentFailure(reason.into())
    }

    /// Temporary failure with the standard retry delay
    pub fn temporary(reason: impl Into<String>) -> Self {
        ReconcileOutcome::TemporaryFailure {
            reason: reason.into(),
            retry_after: TEMPORARY_RETRY_DELAY,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReconcileOutcome::Success)
    }

    /// Failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Success => None,
            ReconcileOutcome::PermanentFailure(reason)
            | ReconcileOutcome::TemporaryFailure { reason, .. } => Some(reason),
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Success => "success",
            ReconcileOutcome::PermanentFailure(_) => "permanent_failure",
            ReconcileOutcome::TemporaryFailure { .. } => "temporary_failure",
        }
    }
}

/// Config and DNS name checks shared by both handlers
fn validate_common<'a>(
    spec: &'a DnsSpec,
    settings: &RouterSettings,
) -> Result<(RouterConfig, &'a str), ReconcileOutcome> {
    let cfg = settings.resolve().map_err(|e| {
        error!(error = %e, "Router configuration incomplete");
        ReconcileOutcome::permanent(e.to_string())
    })?;

    let Some(dns_name) = spec.dns_name() else {
        error!("DNS name is required!");
        return Err(ReconcileOutcome::permanent("DNS name is required!"));
    };

    Ok((cfg, dns_name))
}

fn list_failed(cfg: &RouterConfig, err: &TransportError) -> ReconcileOutcome {
    let reason = format!("Failed to get list of addresses. {}", err);
    error!(
        router = %cfg.host,
        status = ?err.status,
        body = %err.body,
        "Failed to get list of addresses"
    );
    ReconcileOutcome::temporary(reason)
}

/// Handle creation of a DNS resource
pub async fn reconcile_create<A>(
    spec: &DnsSpec,
    settings: &RouterSettings,
    api: &A,
) -> ReconcileOutcome
where
    A: StaticDnsApi + ?Sized,
{
    let (cfg, dns_name) = match validate_common(spec, settings) {
        Ok(v) => v,
        Err(outcome) => return outcome,
    };

    let Some(ip_address) = spec.ip_address() else {
        error!(dns_name = %dns_name, "Next available IP address not implemented yet!");
        return ReconcileOutcome::permanent("Next available IP address not implemented yet!");
    };

    let records = match api.list_static_records(&cfg).await {
        Ok(records) => records,
        Err(e) => return list_failed(&cfg, &e),
    };

    if let Some(existing) = find_by_name(&records, dns_name) {
        error!(
            dns_name = %dns_name,
            record_id = %existing.id,
            address = %existing.address,
            "DNS name already registered"
        );
        return ReconcileOutcome::permanent(format!("DNS: '{}', already registered!", dns_name));
    }

    info!(
        dns_name = %dns_name,
        address = %ip_address,
        "DNS name is available, adding DNS record"
    );

    match api.create_record(&cfg, dns_name, ip_address).await {
        Ok(()) => {
            info!(dns_name = %dns_name, address = %ip_address, "Successfully created DNS record");
            ReconcileOutcome::Success
        }
        Err(e) => {
            error!(
                dns_name = %dns_name,
                address = %ip_address,
                router = %cfg.host,
                status = ?e.status,
                body = %e.body,
                "Failed to set DNS record"
            );
            let reason = format!(
                "Failed to set DNS record '{}' with IP address '{}'. {}",
                dns_name, ip_address, e
            );
            if e.timed_out {
                ReconcileOutcome::temporary(reason)
            } else {
                ReconcileOutcome::permanent(reason)
            }
        }
    }
}

/// Handle deletion of a DNS resource
pub async fn reconcile_delete<A>(
    spec: &DnsSpec,
    settings: &RouterSettings,
    api: &A,
) -> ReconcileOutcome
where
    A: StaticDnsApi + ?Sized,
{
    let (cfg, dns_name) = match validate_common(spec, settings) {
        Ok(v) => v,
        Err(outcome) => return outcome,
    };

    let records = match api.list_static_records(&cfg).await {
        Ok(records) => records,
        Err(e) => return list_failed(&cfg, &e),
    };

    let mut permanent = Vec::new();
    let mut temporary = Vec::new();
    let mut removed = 0usize;

    // A failed entry does not stop the remaining ones from being removed
    for record in matching_records(&records, dns_name) {
        match api.delete_record(&cfg, &record.id).await {
            Ok(()) => {
                removed += 1;
                info!(
                    dns_name = %dns_name,
                    record_id = %record.id,
                    "Successfully removed DNS record"
                );
            }
            Err(e) => {
                error!(
                    dns_name = %dns_name,
                    record_id = %record.id,
                    router = %cfg.host,
                    status = ?e.status,
                    body = %e.body,
                    "Failed to remove DNS record"
                );
                let reason = format!(
                    "Failed to remove DNS record '{}' ({}), {}",
                    dns_name, record.id, e
                );
                if e.timed_out {
                    temporary.push(reason);
                } else {
                    permanent.push(reason);
                }
            }
        }
    }

    if !permanent.is_empty() {
        permanent.extend(temporary);
        return ReconcileOutcome::permanent(permanent.join("; "));
    }
    if !temporary.is_empty() {
        return ReconcileOutcome::temporary(temporary.join("; "));
    }

    if removed == 0 {
        warn!(dns_name = %dns_name, "No DNS record registered under this name, nothing to remove");
    }
    ReconcileOutcome::Success
}
