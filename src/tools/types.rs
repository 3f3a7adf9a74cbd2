//! Parameter schemas advertised to the model.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON Schema for a tool's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    pub schema: Value,
}

impl ToolParameters {
    pub fn from_schema(schema: Value) -> Self {
        Self { schema }
    }

    /// An object schema with no properties.
    pub fn empty() -> Self {
        Self::object().build()
    }

    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for object parameter schemas.
pub struct ParameterBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = json!({ "type": "string", "description": description.into() });
        self.property(name, schema, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = json!({ "type": "integer", "description": description.into() });
        self.property(name, schema, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = json!({ "type": "boolean", "description": description.into() });
        self.property(name, schema, required)
    }

    /// An array of strings, such as an argv.
    pub fn string_array(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = json!({
            "type": "array",
            "items": { "type": "string" },
            "description": description.into(),
        });
        self.property(name, schema, required)
    }

    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}
