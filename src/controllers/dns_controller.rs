//! DNS controller
//!
//! Watches DNS resources and runs the create handler once per resource and
//! the delete handler (behind a finalizer) when the resource goes away.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::{
    api::{ListParams, Patch, PatchParams},
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::{DnsStatus, CONDITION_READY, DNS, PHASE_FAILED, PHASE_PENDING, PHASE_REGISTERED};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::dns::{self as dns_reconciler, ReconcileOutcome, TEMPORARY_RETRY_DELAY};

/// Finalizer name for DNS resources
pub const FINALIZER_NAME: &str = "operators.silvertoken.github.io/dns-finalizer";

/// Field manager used for status patches
const FIELD_MANAGER: &str = "pikube-dns-operator";

/// Run the DNS controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<DNS> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("DNS CRD not installed: {}", e);
        return;
    }

    info!("Starting DNS controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled DNS"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&["DNS"]).inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<DNS>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["DNS"])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&["DNS"]).inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<DNS> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(dns) => apply(dns, &api, ctx.clone()).await,
            FinalizerEvent::Cleanup(dns) => cleanup(dns, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Whether the create handler should run for the current status
#[derive(Debug, PartialEq, Eq)]
enum ApplyGate {
    /// Registered or Failed; updates are not reconciled
    Settled,
    /// Pending and the last attempt is more recent than the retry delay
    Wait(Duration),
    Run,
}

fn apply_gate(status: Option<&DnsStatus>, now: DateTime<Utc>) -> ApplyGate {
    let Some(status) = status else {
        return ApplyGate::Run;
    };
    if status.is_settled() {
        return ApplyGate::Settled;
    }

    // Status writes wake the controller too; they must not cut the retry delay short
    if let (Some(PHASE_PENDING), Some(last)) = (status.phase.as_deref(), status.last_attempt) {
        let elapsed = now.signed_duration_since(last).to_std().unwrap_or_default();
        if elapsed < TEMPORARY_RETRY_DELAY {
            return ApplyGate::Wait(TEMPORARY_RETRY_DELAY - elapsed);
        }
    }
    ApplyGate::Run
}

/// Status to record for a create handler result
#[derive(Debug)]
struct StatusPlan {
    phase: &'static str,
    message: String,
    ready: bool,
    /// Stored status already holds this phase and message
    unchanged: bool,
    action: Action,
}

fn plan_status(outcome: &ReconcileOutcome, current: Option<&DnsStatus>) -> StatusPlan {
    let (phase, message, action) = match outcome {
        ReconcileOutcome::Success => (
            PHASE_REGISTERED,
            "DNS record registered on the router".to_string(),
            Action::await_change(),
        ),
        ReconcileOutcome::PermanentFailure(reason) => {
            (PHASE_FAILED, reason.clone(), Action::await_change())
        }
        ReconcileOutcome::TemporaryFailure {
            reason,
            retry_after,
        } => (PHASE_PENDING, reason.clone(), Action::requeue(*retry_after)),
    };

    let unchanged = current.is_some_and(|s| {
        s.phase.as_deref() == Some(phase) && s.message.as_deref() == Some(message.as_str())
    });

    StatusPlan {
        phase,
        message,
        ready: outcome.is_success(),
        unchanged,
        action,
    }
}

/// Merge patch body for `plan`
///
/// The Ready condition keeps its transition time while the phase stays the same.
fn status_patch(dns: &DNS, plan: &StatusPlan, now: DateTime<Utc>) -> serde_json::Value {
    let transition_time = dns
        .status
        .as_ref()
        .filter(|s| s.phase.as_deref() == Some(plan.phase))
        .and_then(|s| s.ready_condition())
        .map(|c| c.last_transition_time)
        .unwrap_or(now);

    json!({
        "status": {
            "phase": plan.phase,
            "message": plan.message,
            "observedGeneration": dns.metadata.generation,
            "lastAttempt": now,
            "conditions": [{
                "type": CONDITION_READY,
                "status": if plan.ready { "True" } else { "False" },
                "lastTransitionTime": transition_time,
                "reason": plan.phase,
                "message": plan.message
            }]
        }
    })
}

/// Run the create handler unless it already reached a final result
async fn apply(dns: Arc<DNS>, api: &Api<DNS>, ctx: Arc<Context>) -> Result<Action> {
    let name = dns.name_any();
    let now = Utc::now();

    match apply_gate(dns.status.as_ref(), now) {
        ApplyGate::Settled => return Ok(Action::await_change()),
        ApplyGate::Wait(remaining) => {
            debug!(name = %name, remaining = ?remaining, "DNS create retry not due yet");
            return Ok(Action::requeue(remaining));
        }
        ApplyGate::Run => {}
    }

    debug_event("create", &dns);

    let outcome =
        dns_reconciler::reconcile_create(&dns.spec, &ctx.settings, ctx.router.as_ref()).await;
    metrics::RECONCILE_OUTCOMES
        .with_label_values(&["create", outcome.label()])
        .inc();

    match &outcome {
        ReconcileOutcome::Success => {}
        ReconcileOutcome::PermanentFailure(reason) => {
            warn!(name = %name, reason = %reason, "DNS create failed permanently");
        }
        ReconcileOutcome::TemporaryFailure {
            reason,
            retry_after,
        } => {
            warn!(
                name = %name,
                reason = %reason,
                retry_after = ?retry_after,
                "DNS create will be retried"
            );
        }
    }

    let plan = plan_status(&outcome, dns.status.as_ref());
    update_status(&dns, api, &plan, now).await?;
    Ok(plan.action)
}

/// Run the delete handler; a temporary failure keeps the finalizer in place
async fn cleanup(dns: Arc<DNS>, ctx: Arc<Context>) -> Result<Action> {
    let name = dns.name_any();
    info!(name = %name, "Cleaning up DNS");

    debug_event("delete", &dns);

    let outcome =
        dns_reconciler::reconcile_delete(&dns.spec, &ctx.settings, ctx.router.as_ref()).await;
    metrics::RECONCILE_OUTCOMES
        .with_label_values(&["delete", outcome.label()])
        .inc();
    metrics::CLEANUPS.with_label_values(&["DNS"]).inc();

    if let ReconcileOutcome::PermanentFailure(reason) = &outcome {
        warn!(
            name = %name,
            reason = %reason,
            "DNS delete failed permanently, releasing finalizer"
        );
    }
    cleanup_result(outcome)
}

/// `Ok` releases the finalizer, `Err` keeps it and requeues
fn cleanup_result(outcome: ReconcileOutcome) -> Result<Action> {
    match outcome {
        ReconcileOutcome::Success | ReconcileOutcome::PermanentFailure(_) => {
            Ok(Action::await_change())
        }
        ReconcileOutcome::TemporaryFailure {
            reason,
            retry_after,
        } => Err(Error::TemporaryFailure {
            reason,
            retry_after,
        }),
    }
}

fn debug_event(handler: &str, dns: &DNS) {
    debug!(
        handler = handler,
        name = %dns.name_any(),
        spec = ?dns.spec,
        "DNS handler is called"
    );
}

/// Patch the status subresource with the handler result
async fn update_status(
    dns: &DNS,
    api: &Api<DNS>,
    plan: &StatusPlan,
    now: DateTime<Utc>,
) -> Result<()> {
    if plan.unchanged {
        debug!(name = %dns.name_any(), phase = plan.phase, "Status unchanged, skipping patch");
        return Ok(());
    }

    api.patch_status(
        &dns.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(status_patch(dns, plan, now)),
    )
    .await?;

    Ok(())
}

/// Error policy for the controller
fn error_policy(obj: Arc<DNS>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(requeue_delay(error))
}

/// Requeue delay for a failed reconcile
fn requeue_delay(error: &Error) -> Duration {
    if let Some(delay) = error.retry_after() {
        return delay;
    }
    match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Config(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use http::{Request, Response};
    use kube::client::Body;

    use crate::crd::DnsSpec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn status(phase: &str, message: &str) -> DnsStatus {
        DnsStatus {
            phase: Some(phase.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn dns_resource(status: Option<DnsStatus>) -> DNS {
        let mut dns = DNS::new(
            "a-record",
            DnsSpec {
                dns: Some("a.example.com".to_string()),
                ip_address: Some("10.0.0.5".to_string()),
            },
        );
        dns.metadata.namespace = Some("default".to_string());
        dns.metadata.generation = Some(1);
        dns.status = status;
        dns
    }

    /// Status as the API server stores it after `patch` is merged
    fn stored_status(patch: &serde_json::Value) -> DnsStatus {
        serde_json::from_value(patch["status"].clone()).unwrap()
    }

    #[test]
    fn test_apply_gate_runs_for_new_resource() {
        assert_eq!(apply_gate(None, at(0)), ApplyGate::Run);
        assert_eq!(apply_gate(Some(&DnsStatus::default()), at(0)), ApplyGate::Run);
    }

    #[test]
    fn test_apply_gate_skips_settled_resources() {
        for phase in [PHASE_REGISTERED, PHASE_FAILED] {
            assert_eq!(
                apply_gate(Some(&status(phase, "done")), at(0)),
                ApplyGate::Settled
            );
        }
    }

    #[test]
    fn test_apply_gate_waits_out_retry_delay() {
        let mut pending = status(PHASE_PENDING, "router down");
        pending.last_attempt = Some(at(0));

        assert_eq!(
            apply_gate(Some(&pending), at(5)),
            ApplyGate::Wait(Duration::from_secs(25))
        );
        assert_eq!(apply_gate(Some(&pending), at(30)), ApplyGate::Run);
        assert_eq!(apply_gate(Some(&pending), at(45)), ApplyGate::Run);

        pending.last_attempt = None;
        assert_eq!(apply_gate(Some(&pending), at(5)), ApplyGate::Run);
    }

    #[test]
    fn test_apply_gate_future_attempt_waits_full_delay() {
        let mut pending = status(PHASE_PENDING, "router down");
        pending.last_attempt = Some(at(10));

        assert_eq!(
            apply_gate(Some(&pending), at(0)),
            ApplyGate::Wait(TEMPORARY_RETRY_DELAY)
        );
    }

    #[test]
    fn test_plan_status_by_outcome() {
        let plan = plan_status(&ReconcileOutcome::Success, None);
        assert_eq!(plan.phase, PHASE_REGISTERED);
        assert!(plan.ready);
        assert_eq!(plan.action, Action::await_change());

        let plan = plan_status(&ReconcileOutcome::permanent("DNS name is required!"), None);
        assert_eq!(plan.phase, PHASE_FAILED);
        assert_eq!(plan.message, "DNS name is required!");
        assert!(!plan.ready);
        assert_eq!(plan.action, Action::await_change());

        let plan = plan_status(&ReconcileOutcome::temporary("router down"), None);
        assert_eq!(plan.phase, PHASE_PENDING);
        assert!(!plan.ready);
        assert!(!plan.unchanged);
        assert_eq!(plan.action, Action::requeue(Duration::from_secs(30)));
    }

    #[test]
    fn test_plan_status_detects_unchanged_status() {
        let current = status(PHASE_PENDING, "router down");

        let same = plan_status(&ReconcileOutcome::temporary("router down"), Some(&current));
        assert!(same.unchanged);
        assert_eq!(same.action, Action::requeue(TEMPORARY_RETRY_DELAY));

        let other = plan_status(&ReconcileOutcome::temporary("timed out"), Some(&current));
        assert!(!other.unchanged);

        let registered = plan_status(&ReconcileOutcome::Success, Some(&current));
        assert!(!registered.unchanged);
    }

    #[test]
    fn test_pending_status_write_does_not_trigger_immediate_retry() {
        let dns = dns_resource(None);
        let plan = plan_status(&ReconcileOutcome::temporary("router down"), None);

        let written = stored_status(&status_patch(&dns, &plan, at(0)));
        assert_eq!(written.phase.as_deref(), Some(PHASE_PENDING));

        // The watch event for our own write arrives a moment later
        assert_eq!(
            apply_gate(Some(&written), at(1)),
            ApplyGate::Wait(Duration::from_secs(29))
        );
        assert_eq!(apply_gate(Some(&written), at(30)), ApplyGate::Run);
    }

    #[test]
    fn test_status_patch_keeps_transition_time_within_phase() {
        let dns = dns_resource(None);
        let first = plan_status(&ReconcileOutcome::temporary("router down"), None);
        let stored = stored_status(&status_patch(&dns, &first, at(0)));

        let dns = dns_resource(Some(stored.clone()));
        let second = plan_status(&ReconcileOutcome::temporary("timed out"), Some(&stored));
        let patch = status_patch(&dns, &second, at(40));
        let written = stored_status(&patch);

        let ready = written.ready_condition().unwrap();
        assert_eq!(ready.last_transition_time, at(0));
        assert_eq!(ready.status, "False");
        assert_eq!(written.last_attempt, Some(at(40)));
        assert_eq!(patch["status"]["observedGeneration"], 1);

        let third = plan_status(&ReconcileOutcome::Success, Some(&written));
        let registered = stored_status(&status_patch(&dns, &third, at(80)));
        let ready = registered.ready_condition().unwrap();
        assert_eq!(ready.last_transition_time, at(80));
        assert_eq!(ready.status, "True");
        assert!(registered.is_settled());
    }

    #[test]
    fn test_cleanup_temporary_failure_keeps_finalizer() {
        let err = cleanup_result(ReconcileOutcome::temporary("router down")).unwrap_err();

        assert!(matches!(err, Error::TemporaryFailure { .. }));
        assert_eq!(requeue_delay(&err), TEMPORARY_RETRY_DELAY);
    }

    #[test]
    fn test_cleanup_success_and_permanent_failure_release_finalizer() {
        assert_eq!(
            cleanup_result(ReconcileOutcome::Success).unwrap(),
            Action::await_change()
        );
        assert_eq!(
            cleanup_result(ReconcileOutcome::permanent("router rejected delete")).unwrap(),
            Action::await_change()
        );
    }

    #[tokio::test]
    async fn test_update_status_patches_status_subresource() {
        let (mock_service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let api: Api<DNS> = Api::namespaced(client, "default");

        let dns = dns_resource(None);
        let plan = plan_status(&ReconcileOutcome::temporary("router down"), None);
        let reply = dns_resource(Some(stored_status(&status_patch(&dns, &plan, at(0)))));

        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("status patch not issued");
            assert_eq!(request.method(), http::Method::PATCH);
            assert_eq!(
                request.uri().path(),
                "/apis/operators.silvertoken.github.io/v1/namespaces/default/dns/a-record/status"
            );
            assert_eq!(
                request.headers()["content-type"],
                "application/merge-patch+json"
            );

            let body = request.into_body().collect_bytes().await.unwrap();
            let patch: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(patch["status"]["phase"], PHASE_PENDING);
            assert_eq!(patch["status"]["message"], "router down");

            let body = Body::from(serde_json::to_vec(&reply).unwrap());
            send.send_response(Response::builder().status(200).body(body).unwrap());
        });

        update_status(&dns, &api, &plan, at(0)).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_skips_unchanged_status() {
        let (mock_service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let api: Api<DNS> = Api::namespaced(client, "default");

        let current = status(PHASE_PENDING, "router down");
        let dns = dns_resource(Some(current.clone()));
        let plan = plan_status(&ReconcileOutcome::temporary("router down"), Some(&current));

        update_status(&dns, &api, &plan, at(0)).await.unwrap();

        drop(api);
        assert!(handle.next_request().await.is_none());
    }

    #[test]
    fn test_requeue_delay_uses_hint() {
        let err = Error::TemporaryFailure {
            reason: "router down".to_string(),
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(requeue_delay(&err), Duration::from_secs(30));

        let wrapped = Error::Finalizer(Box::new(
            kube::runtime::finalizer::Error::CleanupFailed(Error::TemporaryFailure {
                reason: "router down".to_string(),
                retry_after: Duration::from_secs(12),
            }),
        ));
        assert_eq!(requeue_delay(&wrapped), Duration::from_secs(12));
    }

    #[test]
    fn test_requeue_delay_by_error_kind() {
        assert_eq!(
            requeue_delay(&Error::config("missing")),
            Duration::from_secs(300)
        );
        assert_eq!(
            requeue_delay(&Error::bootstrap("boom")),
            Duration::from_secs(30)
        );
    }
}
