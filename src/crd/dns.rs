//! DNS Custom Resource Definition

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the DNS resource
pub const DNS_GROUP: &str = "operators.silvertoken.github.io";
/// Served and stored version
pub const DNS_VERSION: &str = "v1";
/// Full CRD name
pub const DNS_CRD_NAME: &str = "dns.operators.silvertoken.github.io";

/// Phase recorded once the router entry exists
pub const PHASE_REGISTERED: &str = "Registered";
/// Phase recorded after a permanent failure
pub const PHASE_FAILED: &str = "Failed";
/// Phase recorded while a temporary failure is being retried
pub const PHASE_PENDING: &str = "Pending";

/// Condition type reporting whether the record is registered
pub const CONDITION_READY: &str = "Ready";

/// DNS resource specification.
///
/// Declares a name -> address mapping that should exist in the router's
/// static DNS table while the resource exists.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.silvertoken.github.io",
    version = "v1",
    kind = "DNS",
    plural = "dns",
    singular = "dns",
    shortname = "dns",
    namespaced,
    status = "DnsStatus",
    printcolumn = r#"{"name": "DNS", "type": "string", "jsonPath": ".spec.dns"}"#,
    printcolumn = r#"{"name": "IP", "type": "string", "jsonPath": ".spec.ip_address"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
pub struct DnsSpec {
    /// IP address the name should resolve to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// DNS name to register
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

/// DNS resource status.
///
/// The schema is an open object (`x-kubernetes-preserve-unknown-fields`), so
/// fields written by other tooling survive alongside the ones below.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsStatus {
    /// Registered, Failed or Pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable outcome of the last handler run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// When the result of the last router attempt was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DnsStatus {
    /// The create handler already ran to a final result for this resource
    pub fn is_settled(&self) -> bool {
        matches!(
            self.phase.as_deref(),
            Some(PHASE_REGISTERED) | Some(PHASE_FAILED)
        )
    }

    /// The `Ready` condition, if recorded
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == CONDITION_READY)
    }
}

impl JsonSchema for DnsStatus {
    fn schema_name() -> String {
        "DnsStatus".to_string()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        let mut schema = SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            ..Default::default()
        };
        schema.extensions.insert(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        );
        Schema::Object(schema)
    }
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DnsSpec {
    /// DNS name, if set and non-empty
    pub fn dns_name(&self) -> Option<&str> {
        self.dns.as_deref().filter(|s| !s.is_empty())
    }

    /// IP address, if set and non-empty
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref().filter(|s| !s.is_empty())
    }
}
