//! The data model from spec section 3: routes, render instructions,
//! components, responses, and loading state.

use crate::ids::TransactionId;
use serde::{Deserialize, Serialize};

/// Who may invoke a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteAccess {
    /// Anyone in the organization.
    Public,
    /// Restricted to the named groups.
    Restricted {
        /// Group slugs permitted to invoke this route.
        groups: Vec<String>,
    },
}

impl Default for RouteAccess {
    fn default() -> Self {
        Self::Public
    }
}

/// A flattened slug-path entry in the route tree, as declared to the
/// service during `INITIALIZE_HOST`. This is the wire projection of a
/// route; the handler closure it is paired with lives only in
/// `hostbridge-runtime`'s `RouteRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// `/`-joined slug path, e.g. `"billing/refund"`.
    pub slug: String,
    /// True for a page (may have a layout handler and children), false for
    /// a leaf action.
    pub is_page: bool,
    /// Display name, shown in navigation for pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arbitrary developer-supplied metadata (action description, tags...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Access control.
    #[serde(default)]
    pub access: RouteAccess,
}

/// One on-screen control. The host never validates `initial_props` /
/// `current_props` / return values itself; that is delegated to a
/// `ComponentRegistry` (see `hostbridge-runtime::registry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Name of the component method, e.g. `"INPUT_TEXT"`.
    pub method_name: String,
    /// Label shown above the control.
    pub label: String,
    /// Props as first constructed by the handler.
    pub initial_props: serde_json::Value,
    /// Current props, after any `SET_STATE` round trips have mutated them.
    pub current_props: serde_json::Value,
    /// Whether the component accepts zero-or-more values instead of one.
    #[serde(default)]
    pub is_multiple: bool,
    /// Whether the component may be submitted without a value.
    #[serde(default)]
    pub is_optional: bool,
}

/// Local lifecycle of one component within one render generation. Not
/// serialized to the wire; tracked by `IOClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Rendered, not yet acknowledged by the service as displayed.
    Rendering,
    /// Displayed; waiting on `SET_STATE` or a terminal `RETURN`/`CANCEL`.
    AwaitingResponse,
    /// `RETURN` received; the component's future is resolved.
    Returned,
    /// The render (or the whole transaction) was cancelled.
    Canceled,
}

/// A labelled submit button attached to a render group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceButton {
    /// Button label.
    pub label: String,
    /// Opaque value reported back as `IOResponse`'s choice on activation.
    pub value: String,
}

/// The serialized description of what to display at one render step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderInstruction {
    /// Non-empty ordered list of components to display together.
    pub components: Vec<Component>,
    /// Optional submit buttons for the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_buttons: Option<Vec<ChoiceButton>>,
    /// Opaque token signalling the group carries a registered validator;
    /// submits are expected to round-trip through `VALIDATE` first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_token: Option<String>,
    /// Monotonic generation counter for this transaction's renders, echoed
    /// back on `IOResponse.id` so stale responses can be rejected.
    pub generation: u64,
}

impl RenderInstruction {
    /// `true` if `components` is non-empty, the sole structural invariant
    /// spec.md places on a render instruction.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.components.is_empty()
    }
}

/// The kind of reply carried by an `IOResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IOResponseKind {
    /// Terminal: the component(s) resolved with a final value.
    Return,
    /// Non-terminal: component props changed, resubmit pending.
    SetState,
    /// The user (or service) cancelled this render.
    Cancel,
    /// A validator round-trip: values to validate before commit.
    Validate,
}

/// A reply to a previously sent render instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IOResponse {
    /// Which transaction this reply belongs to.
    pub transaction_id: TransactionId,
    /// Echoes `RenderInstruction::generation`; replies for a stale
    /// generation are ignored.
    pub id: u64,
    /// What kind of reply this is.
    pub kind: IOResponseKind,
    /// Per-component payloads, positional with `RenderInstruction.components`.
    pub values: Vec<serde_json::Value>,
    /// Present when a `ChoiceButton` was activated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
}

/// Coalesced progress report for one transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadingState {
    /// Short progress title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Longer progress description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Total items of work, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_in_queue: Option<u64>,
    /// Items completed so far; monotonically non-decreasing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_completed: Option<u64>,
}

/// The last-known state for one transaction/page key, replayed after
/// reconnect by the resend coordinators.
#[derive(Debug, Clone, Default)]
pub struct PendingRender {
    /// Last render instruction sent, if any.
    pub render: Option<RenderInstruction>,
    /// Last loading state sent, if any.
    pub loading: Option<LoadingState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_render_instruction_is_invalid() {
        let render = RenderInstruction {
            components: vec![],
            choice_buttons: None,
            validator_token: None,
            generation: 0,
        };
        assert!(!render.is_valid());
    }

    #[test]
    fn io_response_kind_round_trips_uppercase() {
        let json = serde_json::to_string(&IOResponseKind::SetState).unwrap();
        assert_eq!(json, "\"SET_STATE\"");
        let back: IOResponseKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IOResponseKind::SetState);
    }

    #[test]
    fn loading_state_defaults_to_all_none() {
        let state = LoadingState::default();
        assert!(state.items_completed.is_none());
        assert!(state.items_in_queue.is_none());
    }

    #[test]
    fn route_access_defaults_to_public() {
        assert_eq!(RouteAccess::default(), RouteAccess::Public);
    }
}
