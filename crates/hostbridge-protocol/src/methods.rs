//! Request/response payload shapes for every fixed RPC method, grouped by
//! direction. `hostbridge-rpc` uses the method name constants to register
//! per-method schemas; `hostbridge-runtime` uses the payload structs
//! directly as the typed ends of each call.

use crate::ids::{PageKey, TransactionId};
use crate::model::{LoadingState, RenderInstruction, Route};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Method names invoked by the host against the service.
pub mod host_to_service {
    /// Declares the route tree and negotiates the session.
    pub const INITIALIZE_HOST: &str = "INITIALIZE_HOST";
    /// Legacy declaration of an HTTP sibling endpoint for enqueue/dequeue.
    pub const DECLARE_HOST: &str = "DECLARE_HOST";
    /// Ships a render instruction for a running transaction.
    pub const SEND_IO_CALL: &str = "SEND_IO_CALL";
    /// Ships a page layout render.
    pub const SEND_PAGE: &str = "SEND_PAGE";
    /// Ships a coalesced loading-state update for a transaction.
    pub const SEND_LOADING_CALL: &str = "SEND_LOADING_CALL";
    /// Ships a coalesced loading-state update for a page session.
    pub const SEND_PAGE_LOADING_CALL: &str = "SEND_PAGE_LOADING_CALL";
    /// Ships one log line.
    pub const SEND_LOG: &str = "SEND_LOG";
    /// Ships a redirect instruction.
    pub const SEND_REDIRECT: &str = "SEND_REDIRECT";
    /// Reports a transaction's terminal result.
    pub const MARK_TRANSACTION_COMPLETE: &str = "MARK_TRANSACTION_COMPLETE";
    /// Requests the service stop dispatching new transactions to this host.
    pub const BEGIN_HOST_SHUTDOWN: &str = "BEGIN_HOST_SHUTDOWN";
}

/// Method names invoked by the service against the host.
pub mod service_to_host {
    /// Dispatches a new action run.
    pub const START_TRANSACTION: &str = "START_TRANSACTION";
    /// Dispatches a new page session.
    pub const OPEN_PAGE: &str = "OPEN_PAGE";
    /// Tears down a page session.
    pub const CLOSE_PAGE: &str = "CLOSE_PAGE";
    /// Tears down a transaction (cancellation).
    pub const CLOSE_TRANSACTION: &str = "CLOSE_TRANSACTION";
    /// Delivers a user's reply to an outstanding render.
    pub const IO_RESPONSE: &str = "IO_RESPONSE";
}

/// Organization identity returned during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationInfo {
    /// Organization id.
    pub id: String,
    /// Organization display name.
    pub name: String,
}

/// Environment identity returned during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Environment id.
    pub id: String,
    /// Environment name (e.g. `"production"`, `"development"`).
    pub name: String,
}

/// An alert the service wants the developer to see (e.g. an SDK deprecation
/// notice), surfaced out of band from the RPC return value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkAlert {
    /// Severity: `"info" | "warning" | "error"`.
    pub severity: String,
    /// Message to print.
    pub message: String,
}

/// `INITIALIZE_HOST` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeHostRequest {
    /// Flattened action routes.
    pub actions: Vec<Route>,
    /// Flattened page routes.
    pub pages: Vec<Route>,
    /// SDK package name, for telemetry and compatibility checks.
    pub sdk_name: String,
    /// SDK package version.
    pub sdk_version: String,
}

/// `INITIALIZE_HOST` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeHostResponse {
    /// The organization this host is registered under.
    pub organization: OrganizationInfo,
    /// The environment this host is registered under.
    pub environment: EnvironmentInfo,
    /// URL of the dashboard for this organization.
    pub dashboard_url: String,
    /// Non-fatal warnings (e.g. deprecated config shapes in use).
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Slugs that failed to register (duplicates, malformed paths).
    #[serde(default)]
    pub invalid_slugs: Vec<String>,
    /// Optional alert to surface to the developer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_alert: Option<SdkAlert>,
}

/// `DECLARE_HOST` request: registers the HTTP sibling endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclareHostRequest {
    /// `http[s]` endpoint derived from the websocket endpoint.
    pub http_host: String,
}

/// `SEND_IO_CALL` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendIoCallRequest {
    /// Target transaction.
    pub transaction_id: TransactionId,
    /// The render to display.
    pub render: RenderInstruction,
}

/// `SEND_PAGE` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPageRequest {
    /// Target page session.
    pub page_key: PageKey,
    /// The layout render to display.
    pub render: RenderInstruction,
}

/// `SEND_LOADING_CALL` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLoadingCallRequest {
    /// Target transaction.
    pub transaction_id: TransactionId,
    /// The coalesced loading state.
    pub loading: LoadingState,
}

/// `SEND_PAGE_LOADING_CALL` request: the page-session counterpart of
/// [`SendLoadingCallRequest`], mirroring the existing `SEND_PAGE` /
/// `SEND_IO_CALL` split between page and transaction wire methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPageLoadingCallRequest {
    /// Target page session.
    pub page_key: PageKey,
    /// The coalesced loading state.
    pub loading: LoadingState,
}

/// Maximum length of one `ctx.log` payload before truncation (spec §4.5).
pub const LOG_MESSAGE_CAP: usize = 10_000;

/// Marker appended to a log message truncated at [`LOG_MESSAGE_CAP`].
pub const LOG_TRUNCATION_MARKER: &str = "... (truncated)";

/// `SEND_LOG` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLogRequest {
    /// Target transaction.
    pub transaction_id: TransactionId,
    /// Monotonically increasing per-transaction index.
    pub index: u64,
    /// The (possibly truncated) log message.
    pub message: String,
    /// When the log call was made.
    pub timestamp: DateTime<Utc>,
}

/// `SEND_REDIRECT` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRedirectRequest {
    /// Target transaction.
    pub transaction_id: TransactionId,
    /// Destination, either an absolute URL or an in-app route slug.
    pub url: String,
}

/// Terminal status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    /// The handler returned successfully.
    Success,
    /// The handler threw, or returned a value that failed output validation.
    Failure,
    /// The transaction was cancelled (server- or handler-initiated).
    Canceled,
    /// The transaction ended via `ctx.redirect`.
    Redirected,
}

/// Structured error info serialized into a `FAILURE` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionError {
    /// Error type name (e.g. the Rust error variant's name).
    pub name: String,
    /// Error message.
    pub message: String,
    /// Optional chained cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// The terminal outcome of one transaction, reported via
/// `MARK_TRANSACTION_COMPLETE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Schema version of this result shape, for forward compatibility.
    pub schema_version: u32,
    /// Terminal status.
    pub status: ActionStatus,
    /// The handler's return value, present on `SUCCESS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Structured error info, present on `FAILURE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
    /// Arbitrary developer-supplied result metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ActionResult {
    /// Schema version produced by this crate.
    pub const SCHEMA_VERSION: u32 = 1;

    /// Build a `SUCCESS` result.
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            status: ActionStatus::Success,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    /// Build a `FAILURE` result from structured error info.
    #[must_use]
    pub fn failure(error: ActionError) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            status: ActionStatus::Failure,
            data: None,
            error: Some(error),
            meta: None,
        }
    }

    /// Build a `CANCELED` result.
    #[must_use]
    pub fn canceled() -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            status: ActionStatus::Canceled,
            data: None,
            error: None,
            meta: None,
        }
    }

    /// Build a `REDIRECTED` result.
    #[must_use]
    pub fn redirected() -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION,
            status: ActionStatus::Redirected,
            data: None,
            error: None,
            meta: None,
        }
    }
}

/// `MARK_TRANSACTION_COMPLETE` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkTransactionCompleteRequest {
    /// The transaction being reported.
    pub transaction_id: TransactionId,
    /// Its terminal result.
    pub result: ActionResult,
}

/// `BEGIN_HOST_SHUTDOWN` request. No fields: draining is keyed by the
/// connection itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeginHostShutdownRequest {}

/// Unit acknowledgement shared by methods whose response carries no data
/// beyond "received".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Reference to the action a `START_TRANSACTION` is invoking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRef {
    /// Flattened slug path.
    pub slug: String,
    /// Deep link back to this transaction in the dashboard.
    pub url: String,
}

/// Reference to the page a `OPEN_PAGE` is opening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRef {
    /// Flattened slug path.
    pub slug: String,
}

/// Identity of the end user who triggered the transaction or page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    /// User id.
    pub id: String,
    /// User email.
    pub email: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `START_TRANSACTION` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTransactionRequest {
    /// Newly assigned transaction id.
    pub transaction_id: TransactionId,
    /// Which action to run.
    pub action: ActionRef,
    /// Environment the transaction runs in.
    pub environment: EnvironmentInfo,
    /// Who triggered it.
    pub user: UserContext,
    /// Action parameters, validated by developer code, not this crate.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Metadata about how each param was supplied (e.g. from a URL vs a
    /// prior page), opaque to the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_meta: Option<serde_json::Value>,
}

/// `OPEN_PAGE` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPageRequest {
    /// Newly assigned page key.
    pub page_key: PageKey,
    /// Which page to open.
    pub page: PageRef,
    /// Environment the page runs in.
    pub environment: EnvironmentInfo,
    /// Who opened it.
    pub user: UserContext,
    /// Page parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// `CLOSE_TRANSACTION` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseTransactionRequest {
    /// The transaction to tear down.
    pub transaction_id: TransactionId,
}

/// `CLOSE_PAGE` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePageRequest {
    /// The page session to tear down.
    pub page_key: PageKey,
}

/// Truncate a log message to [`LOG_MESSAGE_CAP`], appending
/// [`LOG_TRUNCATION_MARKER`] when truncation occurred.
///
/// Exactly [`LOG_MESSAGE_CAP`] characters pass through untouched; one
/// character over is truncated (spec section 8 boundary behavior).
#[must_use]
pub fn truncate_log_message(message: &str) -> String {
    let char_count = message.chars().count();
    if char_count <= LOG_MESSAGE_CAP {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(LOG_MESSAGE_CAP).collect();
    truncated.push_str(LOG_TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_result_builders_set_expected_status() {
        assert_eq!(
            ActionResult::success(serde_json::json!("ok")).status,
            ActionStatus::Success
        );
        assert_eq!(ActionResult::canceled().status, ActionStatus::Canceled);
        assert_eq!(ActionResult::redirected().status, ActionStatus::Redirected);
    }

    #[test]
    fn log_message_at_cap_is_untouched() {
        let message = "a".repeat(LOG_MESSAGE_CAP);
        assert_eq!(truncate_log_message(&message), message);
    }

    #[test]
    fn log_message_one_over_cap_is_truncated() {
        let message = "a".repeat(LOG_MESSAGE_CAP + 1);
        let truncated = truncate_log_message(&message);
        assert!(truncated.ends_with(LOG_TRUNCATION_MARKER));
        assert_eq!(
            truncated.len(),
            LOG_MESSAGE_CAP + LOG_TRUNCATION_MARKER.len()
        );
    }

    #[test]
    fn action_status_serializes_uppercase() {
        let json = serde_json::to_string(&ActionStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
    }
}
