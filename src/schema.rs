//! Input schemas.
//!
//! The router only needs one thing from a schema: "here is a JSON value,
//! give me back the canonical value or a list of field errors". That is the
//! [`Schema`] trait. Whatever the schema returns on success is what the
//! handler sees, so coercions and key-stripping are authoritative.
//!
//! Three implementations ship with the crate:
//!
//! - [`ObjectSchema`]: declarative object shape with required/optional fields.
//! - [`SerdeSchema<T>`]: "does it deserialize into `T`?".
//! - `ValidatorSchema<T>`: serde plus the `validator` crate's derive rules
//!   (behind the `validator` feature).

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single validation issue, shaped so clients can render it per field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    pub path: Vec<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(code: impl Into<String>, path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            expected: None,
            received: None,
            path,
            message: message.into(),
        }
    }

    fn invalid_type(path: Vec<String>, expected: &str, received: &str) -> Self {
        let message = if received == "undefined" {
            "Required".to_owned()
        } else {
            format!("Expected {expected}, received {received}")
        };
        Self {
            code: "invalid_type".to_owned(),
            expected: Some(expected.to_owned()),
            received: Some(received.to_owned()),
            path,
            message,
        }
    }

    pub(crate) fn from_serde(err: &serde_json::Error) -> Self {
        Self::new("invalid_input", Vec::new(), err.to_string())
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// The validation contract the router consumes.
pub trait Schema: Send + Sync + 'static {
    /// Validates `input`. `Ok` carries the canonical value handed to the handler.
    fn safe_validate(&self, input: &Value) -> Result<Value, Vec<FieldError>>;
}

impl<F> Schema for F
where
    F: Fn(&Value) -> Result<Value, Vec<FieldError>> + Send + Sync + 'static,
{
    fn safe_validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        self(input)
    }
}

// ── ObjectSchema ──────────────────────────────────────────────────────────────

/// The JSON type a field must hold.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    Any,
    Array,
    Boolean,
    Integer,
    Number,
    Object,
    String,
}

impl FieldType {
    fn name(self) -> &'static str {
        match self {
            Self::Any     => "any",
            Self::Array   => "array",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number  => "number",
            Self::Object  => "object",
            Self::String  => "string",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Any     => true,
            Self::Array   => value.is_array(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number  => value.is_number(),
            Self::Object  => value.is_object(),
            Self::String  => value.is_string(),
        }
    }

    /// String → number/boolean coercion. `None` when the string does not parse.
    fn coerce(self, value: &Value) -> Option<Value> {
        let s = value.as_str()?.trim();
        match self {
            Self::Boolean => s.parse::<bool>().ok().map(Value::Bool),
            Self::Integer => s.parse::<i64>().ok().map(Value::from),
            Self::Number  => s.parse::<f64>().ok().and_then(|n| {
                serde_json::Number::from_f64(n).map(Value::Number)
            }),
            _ => None,
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug)]
struct Field {
    name: String,
    ty: FieldType,
    required: bool,
}

/// A declarative object schema.
///
/// Unknown keys are dropped from the canonical value unless
/// [`passthrough`](ObjectSchema::passthrough) is set. Every issue in the
/// input is reported, not just the first.
///
/// ```rust
/// use minirpc::schema::{FieldType, ObjectSchema, Schema};
/// use serde_json::json;
///
/// let schema = ObjectSchema::new()
///     .required("name", FieldType::String)
///     .optional("age", FieldType::Integer)
///     .coerce();
///
/// let ok = schema.safe_validate(&json!({ "name": "Ann", "age": "42", "extra": 1 }));
/// assert_eq!(ok.unwrap(), json!({ "name": "Ann", "age": 42 }));
///
/// let err = schema.safe_validate(&json!({ "bogus": 1 })).unwrap_err();
/// assert_eq!(err[0].path, vec!["name"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ObjectSchema {
    fields: Vec<Field>,
    coerce: bool,
    passthrough: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field(name.into(), ty, true)
    }

    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field(name.into(), ty, false)
    }

    /// Accept numeric and boolean fields sent as strings (`"42"`, `"true"`).
    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }

    /// Keep keys the schema does not declare.
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    fn field(mut self, name: String, ty: FieldType, required: bool) -> Self {
        // Redeclaring a field replaces it.
        self.fields.retain(|f| f.name != name);
        self.fields.push(Field { name, ty, required });
        self
    }

    fn check_field(&self, field: &Field, value: &Value) -> Result<Value, FieldError> {
        if field.ty.matches(value) {
            return Ok(value.clone());
        }
        if self.coerce {
            if let Some(coerced) = field.ty.coerce(value) {
                return Ok(coerced);
            }
        }
        Err(FieldError::invalid_type(
            vec![field.name.clone()],
            field.ty.name(),
            type_name(value),
        ))
    }
}

impl Schema for ObjectSchema {
    fn safe_validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        let Some(object) = input.as_object() else {
            return Err(vec![FieldError::invalid_type(Vec::new(), "object", type_name(input))]);
        };

        let mut out = if self.passthrough { object.clone() } else { Map::new() };
        let mut errors = Vec::new();

        for field in &self.fields {
            match object.get(&field.name) {
                None if field.required => errors.push(FieldError::invalid_type(
                    vec![field.name.clone()],
                    field.ty.name(),
                    "undefined",
                )),
                None => {}
                Some(Value::Null) if !field.required => {
                    out.insert(field.name.clone(), Value::Null);
                }
                Some(value) => match self.check_field(field, value) {
                    Ok(v) => {
                        out.insert(field.name.clone(), v);
                    }
                    Err(e) => errors.push(e),
                },
            }
        }

        if errors.is_empty() { Ok(Value::Object(out)) } else { Err(errors) }
    }
}

// ── SerdeSchema ───────────────────────────────────────────────────────────────

/// Validates by round-tripping through `T`.
///
/// Defaults, renames and `deny_unknown_fields` on `T` all apply, and the
/// re-serialized `T` is the canonical value.
pub struct SerdeSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeSchema<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for SerdeSchema<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn safe_validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        let typed = T::deserialize(input).map_err(|e| vec![FieldError::from_serde(&e)])?;
        serde_json::to_value(&typed).map_err(|e| vec![FieldError::from_serde(&e)])
    }
}

// ── ValidatorSchema ───────────────────────────────────────────────────────────

/// [`SerdeSchema`] followed by `validator::Validate`.
#[cfg(feature = "validator")]
pub struct ValidatorSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

#[cfg(feature = "validator")]
impl<T> ValidatorSchema<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

#[cfg(feature = "validator")]
impl<T> Default for ValidatorSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "validator")]
impl<T> Schema for ValidatorSchema<T>
where
    T: validator::Validate + DeserializeOwned + Serialize + 'static,
{
    fn safe_validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        let typed = T::deserialize(input).map_err(|e| vec![FieldError::from_serde(&e)])?;

        if let Err(errors) = typed.validate() {
            let mut issues: Vec<FieldError> = errors
                .field_errors()
                .into_iter()
                .flat_map(|(field, errs)| {
                    let field = field.to_string();
                    errs.iter().map(move |e| {
                        let message = e
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("failed `{}` check", e.code));
                        FieldError::new(e.code.to_string(), vec![field.clone()], message)
                    })
                })
                .collect();
            // field_errors() is a HashMap; keep the output stable.
            issues.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.code.cmp(&b.code)));
            return Err(issues);
        }

        serde_json::to_value(&typed).map_err(|e| vec![FieldError::from_serde(&e)])
    }
}
