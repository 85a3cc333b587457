//! Per-method input/output schemas.
//!
//! A "schema" here is a strongly-typed validator: rather than an open JSON
//! Schema registry, each method is tied to the Rust types already declared
//! in `hostbridge_protocol::methods`, and validation is "does this value
//! deserialize into that type."

use std::collections::HashMap;
use std::sync::Arc;

use hostbridge_protocol::ValidationError;
use serde::de::DeserializeOwned;
use serde_json::Value;

type Validator = Arc<dyn Fn(&Value) -> Result<(), ValidationError> + Send + Sync>;

/// The input and output validators registered for one method name.
#[derive(Clone)]
pub struct MethodSchema {
    input: Validator,
    output: Validator,
}

impl MethodSchema {
    /// Build a schema from the Rust types that back a method's call input
    /// and response output.
    #[must_use]
    pub fn typed<In, Out>(method_name: &str) -> Self
    where
        In: DeserializeOwned + 'static,
        Out: DeserializeOwned + 'static,
    {
        Self {
            input: Arc::new(type_validator::<In>(method_name)),
            output: Arc::new(type_validator::<Out>(method_name)),
        }
    }

    /// A schema that accepts any input and any output unchecked, for
    /// methods whose payload is opaque at this layer (validated further up,
    /// e.g. by a `ComponentRegistry`).
    #[must_use]
    pub fn opaque() -> Self {
        Self {
            input: Arc::new(|_| Ok(())),
            output: Arc::new(|_| Ok(())),
        }
    }

    pub(crate) fn validate_input(&self, value: &Value) -> Result<(), ValidationError> {
        (self.input)(value)
    }

    pub(crate) fn validate_output(&self, value: &Value) -> Result<(), ValidationError> {
        (self.output)(value)
    }
}

fn type_validator<T>(method_name: &str) -> impl Fn(&Value) -> Result<(), ValidationError> + Send + Sync
where
    T: DeserializeOwned + 'static,
{
    let name = method_name.to_string();
    move |value: &Value| {
        serde_json::from_value::<T>(value.clone())
            .map(|_| ())
            .map_err(|e| ValidationError::new(name.clone(), e.to_string()))
    }
}

/// The full set of method schemas one side of a `DuplexRPC` declares,
/// covering both the methods it calls and the methods it responds to.
#[derive(Clone, Default)]
pub struct MethodTable {
    entries: HashMap<String, MethodSchema>,
}

impl MethodTable {
    /// An empty table; register methods with [`MethodTable::register`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the schema for one method name.
    pub fn register(&mut self, method_name: impl Into<String>, schema: MethodSchema) -> &mut Self {
        self.entries.insert(method_name.into(), schema);
        self
    }

    /// Look up the schema for a method name, if registered.
    #[must_use]
    pub fn get(&self, method_name: &str) -> Option<&MethodSchema> {
        self.entries.get(method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Ping {
        #[allow(dead_code)]
        value: u32,
    }

    #[test]
    fn typed_schema_accepts_matching_shape() {
        let schema = MethodSchema::typed::<Ping, Ping>("PING");
        assert!(schema.validate_input(&json!({"value": 1})).is_ok());
    }

    #[test]
    fn typed_schema_rejects_mismatched_shape() {
        let schema = MethodSchema::typed::<Ping, Ping>("PING");
        assert!(schema.validate_input(&json!({"wrong": true})).is_err());
    }

    #[test]
    fn opaque_schema_accepts_anything() {
        let schema = MethodSchema::opaque();
        assert!(schema.validate_input(&json!(null)).is_ok());
        assert!(schema.validate_output(&json!([1, 2, 3])).is_ok());
    }

    #[test]
    fn table_lookup_reflects_registration() {
        let mut table = MethodTable::new();
        assert!(table.get("PING").is_none());
        table.register("PING", MethodSchema::opaque());
        assert!(table.get("PING").is_some());
    }
}
