use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "flowgroup::events::telemetry";

pub const OP_GROUP_SELECTION: &str = "GroupSelection";
pub const OP_UNGROUP: &str = "Ungroup";
pub const OP_TOGGLE_COLLAPSE: &str = "ToggleCollapse";
pub const OP_MINIMIZE: &str = "Minimize";
pub const OP_RESTORE: &str = "Restore";
pub const OP_DROP: &str = "Drop";
pub const OP_DELETE: &str = "Delete";
pub const OP_CREATE_GROUP: &str = "CreateGroup";
pub const OP_DUPLICATE: &str = "Duplicate";
pub const OP_RENAME: &str = "Rename";
pub const OP_REPARENT: &str = "Reparent";
pub const OP_RESIZE: &str = "Resize";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationLifecycle {
    Start,
    Success,
    Rejected,
}

impl fmt::Display for OperationLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "operation_start"),
            Self::Success => write!(f, "operation_success"),
            Self::Rejected => write!(f, "operation_rejected"),
        }
    }
}

/// One lifecycle record of a session operation, tied together by a
/// correlation id so start and outcome can be matched in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTelemetry {
    pub correlation_id: String,
    pub operation: String,
    pub lifecycle: OperationLifecycle,
    pub reason: Option<String>,
    pub changed: Option<usize>,
}

impl OperationTelemetry {
    fn new(operation: &str, correlation_id: &str, lifecycle: OperationLifecycle) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            operation: operation.to_string(),
            lifecycle,
            reason: None,
            changed: None,
        }
    }

    fn now_unix_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn operation_start(operation: &str, correlation_id: &str) -> OperationTelemetry {
    let telemetry = OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Start);
    debug!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_start"
    );
    telemetry
}

pub fn operation_success(
    operation: &str,
    correlation_id: &str,
    changed: usize,
) -> OperationTelemetry {
    let mut telemetry =
        OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Success);
    telemetry.changed = Some(changed);
    info!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        changed,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_success"
    );
    telemetry
}

pub fn operation_rejected(
    operation: &str,
    correlation_id: &str,
    reason: impl Into<String>,
) -> OperationTelemetry {
    let mut telemetry =
        OperationTelemetry::new(operation, correlation_id, OperationLifecycle::Rejected);
    telemetry.reason = Some(reason.into());
    let reason = telemetry.reason.as_deref().unwrap_or("unclassified");

    warn!(
        target: TELEMETRY_TARGET,
        operation = %telemetry.operation,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        reason = %reason,
        timestamp_ms = OperationTelemetry::now_unix_ms(),
        "operation_rejected"
    );
    telemetry
}
