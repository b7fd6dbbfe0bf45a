//! Schema-driven input forms.
//!
//! An actor's input schema is a JSON-schema-like object whose `properties`
//! map field names to descriptors. Each descriptor becomes one [`FormField`]
//! carrying a [`FieldKind`]; the kind decides both the control a client shows
//! and how the edited value is turned into the run payload (see
//! [`values`]). Fields keep the schema's declared key order.

pub mod values;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use values::FieldValue;

pub const NO_PARAMETERS_MESSAGE: &str =
    "This actor has no configurable parameters. You can execute it directly.";

/// The control a field is edited with. Serialized as `{"kind": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    /// String with an `enum`: single choice over the options.
    Select { options: Vec<String> },
    /// Long string (`format: textarea` or `maxLength > 100`).
    Textarea,
    /// Plain string, and the fallback for unrecognized types.
    Text,
    Number {
        integer: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Toggle,
    /// Array entered as one item per line.
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Shown to the user only; the platform enforces it.
    #[serde(default)]
    pub required: bool,
    pub control: FieldKind,
}

impl FormField {
    pub fn from_descriptor(key: &str, descriptor: &Value, required_by_schema: bool) -> Self {
        let label = descriptor
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(key)
            .to_string();
        let description = descriptor
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let required = required_by_schema
            || descriptor
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false);

        FormField {
            key: key.to_string(),
            label,
            description,
            required,
            control: classify(descriptor),
        }
    }
}

fn declared_type(descriptor: &Value) -> Option<&str> {
    match descriptor.get("type")? {
        Value::String(t) => Some(t.as_str()),
        // `["string", "null"]` style unions: first concrete type wins.
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

fn classify(descriptor: &Value) -> FieldKind {
    match declared_type(descriptor) {
        Some("string") => {
            if let Some(options) = descriptor.get("enum").and_then(Value::as_array) {
                return FieldKind::Select {
                    options: options
                        .iter()
                        .map(|o| match o {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect(),
                };
            }
            let textarea = ["format", "editor"]
                .iter()
                .any(|k| descriptor.get(*k).and_then(Value::as_str) == Some("textarea"));
            let long = descriptor
                .get("maxLength")
                .and_then(Value::as_f64)
                .is_some_and(|n| n > 100.0);
            if textarea || long {
                FieldKind::Textarea
            } else {
                FieldKind::Text
            }
        }
        Some(t @ ("number" | "integer")) => FieldKind::Number {
            integer: t == "integer",
            minimum: descriptor.get("minimum").and_then(Value::as_f64),
            maximum: descriptor.get("maximum").and_then(Value::as_f64),
        },
        Some("boolean") => FieldKind::Toggle,
        Some("array") => FieldKind::List,
        _ => FieldKind::Text,
    }
}

/// Fields for one actor plus the values edited so far.
#[derive(Debug, Clone, Default)]
pub struct InputForm {
    actor_id: Option<String>,
    fields: Vec<FormField>,
    values: values::FormValues,
}

impl InputForm {
    pub fn from_schema(schema: &Value) -> Self {
        Self {
            actor_id: None,
            fields: fields_from_schema(schema),
            values: Default::default(),
        }
    }

    /// Point the form at another actor. All edited values are dropped.
    pub fn switch_actor(&mut self, actor_id: &str, fields: Vec<FormField>) {
        self.actor_id = Some(actor_id.to_string());
        self.fields = fields;
        self.values.clear();
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// True when the schema declares no properties; the form can still be
    /// submitted with an empty payload.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn set(&mut self, key: &str, value: FieldValue) {
        self.values.set(key, value);
    }

    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Fill the form from a previously submitted payload.
    pub fn load(&mut self, payload: &Map<String, Value>) {
        self.values.clear();
        for field in &self.fields {
            if let Some(stored) = payload.get(&field.key) {
                self.values
                    .set(&field.key, values::render_value(&field.control, stored));
            }
        }
    }

    /// The run payload, in field order. Fields whose value does not survive
    /// parsing are left out.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        for field in &self.fields {
            if let Some(value) = values::serialize_value(&field.control, self.values.get(&field.key))
            {
                payload.insert(field.key.clone(), value);
            }
        }
        payload
    }
}

pub fn fields_from_schema(schema: &Value) -> Vec<FormField> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(key, descriptor)| {
                    FormField::from_descriptor(key, descriptor, required.contains(&key.as_str()))
                })
                .collect()
        })
        .unwrap_or_default()
}
