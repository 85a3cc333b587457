//! Component descriptors (the chained-builder surface handlers use to
//! declare what to render) and the `ComponentRegistry` collaborator that
//! owns concrete component schemas (spec section 6, 9 "Chained builders").

use std::collections::HashSet;
use std::sync::Arc;

use hostbridge_protocol::ValidationError;
use hostbridge_protocol::model::{ChoiceButton, Component};
use serde_json::Value;

/// An immutable descriptor for one component, built by chaining
/// `optional()`/`multiple()` onto a base. Compiled into a wire
/// [`Component`] at render time.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    method_name: String,
    label: String,
    initial_props: Value,
    is_multiple: bool,
    is_optional: bool,
}

impl ComponentDescriptor {
    #[must_use]
    pub fn new(method_name: impl Into<String>, label: impl Into<String>, initial_props: Value) -> Self {
        Self {
            method_name: method_name.into(),
            label: label.into(),
            initial_props,
            is_multiple: false,
            is_optional: false,
        }
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.is_multiple = true;
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub(crate) fn compile(&self) -> Component {
        Component {
            method_name: self.method_name.clone(),
            label: self.label.clone(),
            initial_props: self.initial_props.clone(),
            current_props: self.initial_props.clone(),
            is_multiple: self.is_multiple,
            is_optional: self.is_optional,
        }
    }
}

/// A validator rejects a submitted group by returning `Some(message)`;
/// `None` accepts.
pub type Validator = Arc<dyn Fn(&[Value]) -> Option<String> + Send + Sync>;

/// One or more components rendered together as a single round-trip, with
/// optional submit buttons and a chained validator.
#[derive(Clone)]
pub struct Group {
    pub(crate) components: Vec<ComponentDescriptor>,
    pub(crate) choice_buttons: Option<Vec<ChoiceButton>>,
    pub(crate) validator: Option<Validator>,
}

impl Group {
    #[must_use]
    pub fn new(components: Vec<ComponentDescriptor>) -> Self {
        Self {
            components,
            choice_buttons: None,
            validator: None,
        }
    }

    #[must_use]
    pub fn single(descriptor: ComponentDescriptor) -> Self {
        Self::new(vec![descriptor])
    }

    #[must_use]
    pub fn with_choices(mut self, buttons: Vec<ChoiceButton>) -> Self {
        self.choice_buttons = Some(buttons);
        self
    }

    #[must_use]
    pub fn validate(mut self, validator: impl Fn(&[Value]) -> Option<String> + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

/// The result of one resolved group render: per-component return values in
/// declaration order, plus the activated choice button's value, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    pub values: Vec<Value>,
    pub choice: Option<String>,
}

/// Concrete component schemas are an external collaborator (spec section
/// 1's "out of scope"); this crate only depends on this trait.
pub trait ComponentRegistry: Send + Sync {
    fn method_names(&self) -> &HashSet<String>;
    fn parse_props(&self, method: &str, raw: &Value) -> Result<Value, ValidationError>;
    fn parse_return(&self, method: &str, raw: &Value) -> Result<Value, ValidationError>;
    fn parse_state(&self, method: &str, raw: &Value) -> Result<Value, ValidationError>;
}

/// Accepts any method name and treats every payload as opaque JSON.
/// Useful as a default and in tests; production hosts typically supply a
/// registry backed by their actual component schemas.
#[derive(Default)]
pub struct PermissiveRegistry {
    known: HashSet<String>,
}

impl PermissiveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComponentRegistry for PermissiveRegistry {
    fn method_names(&self) -> &HashSet<String> {
        &self.known
    }

    fn parse_props(&self, _method: &str, raw: &Value) -> Result<Value, ValidationError> {
        Ok(raw.clone())
    }

    fn parse_return(&self, _method: &str, raw: &Value) -> Result<Value, ValidationError> {
        Ok(raw.clone())
    }

    fn parse_state(&self, _method: &str, raw: &Value) -> Result<Value, ValidationError> {
        Ok(raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_compiles_with_initial_props_mirrored_into_current_props() {
        let descriptor = ComponentDescriptor::new("input.text", "Name", json!({"placeholder": "Ada"}));
        let component = descriptor.compile();
        assert_eq!(component.initial_props, component.current_props);
        assert!(!component.is_multiple);
        assert!(!component.is_optional);
    }

    #[test]
    fn optional_and_multiple_chain_independently() {
        let descriptor = ComponentDescriptor::new("input.text", "Name", json!({})).optional().multiple();
        let component = descriptor.compile();
        assert!(component.is_multiple);
        assert!(component.is_optional);
    }

    #[test]
    fn permissive_registry_accepts_any_payload() {
        let registry = PermissiveRegistry::new();
        assert_eq!(registry.parse_props("anything", &json!(42)).unwrap(), json!(42));
        assert_eq!(registry.parse_return("anything", &json!("x")).unwrap(), json!("x"));
    }
}
