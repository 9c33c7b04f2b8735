//! Shape and type checks for incoming book payloads.
//!
//! A payload is accepted only when it is a JSON object holding exactly the
//! fields of [`BOOK_SCHEMA`], each with the declared primitive type. All
//! violations are collected rather than stopping at the first one.

use std::fmt;

use bookshelf_http::error::AppError;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Value kinds a book field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// String that may not be empty; used for the key so every stored book
    /// stays addressable by `/{isbn}`
    Key,
    /// Absolute URI such as `http://a.co/eobPtX3`
    Uri,
    Integer,
}

impl FieldType {
    fn describe(self) -> &'static str {
        match self {
            FieldType::String | FieldType::Key => "a string",
            FieldType::Uri => "a URI",
            FieldType::Integer => "an integer",
        }
    }

    /// Error text for `value`, or `None` when it is acceptable.
    fn check(self, value: &Value) -> Option<String> {
        match (self, value) {
            (FieldType::String, Value::String(_)) => None,
            (FieldType::Key, Value::String(text)) if text.is_empty() => {
                Some("must not be empty".to_string())
            }
            (FieldType::Key, Value::String(_)) => None,
            (FieldType::Uri, Value::String(text)) => match Url::parse(text) {
                Ok(_) => None,
                Err(_) => Some("must be a URI".to_string()),
            },
            (FieldType::Integer, value) if value.is_i64() => None,
            _ => Some(format!(
                "must be {}, got {}",
                self.describe(),
                json_type(value)
            )),
        }
    }
}

/// Every required book field and its type, in display order.
pub const BOOK_SCHEMA: &[(&str, FieldType)] = &[
    ("isbn", FieldType::Key),
    ("amazon_url", FieldType::Uri),
    ("author", FieldType::String),
    ("language", FieldType::String),
    ("pages", FieldType::Integer),
    ("publisher", FieldType::String),
    ("title", FieldType::String),
    ("year", FieldType::Integer),
];

/// Field used in violations that concern the payload as a whole.
const BODY_FIELD: &str = "body";

/// One rejected aspect of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub error: String,
}

impl Violation {
    fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

#[derive(Debug, Error)]
#[error("invalid book payload: {}", summary(.violations))]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

fn summary(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        let details = err
            .violations
            .iter()
            .map(|violation| serde_json::json!(violation))
            .collect();
        AppError::validation(details, message)
    }
}

/// Raw request body. Parsing fails on a repeated top-level key instead of
/// keeping the last occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct BookPayload(pub Value);

impl<'de> Deserialize<'de> for BookPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PayloadVisitor).map(BookPayload)
    }
}

struct PayloadVisitor;

impl<'de> Visitor<'de> for PayloadVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            if fields.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate field `{key}`")));
            }
            let value = map.next_value::<Value>()?;
            fields.insert(key, value);
        }
        Ok(Value::Object(fields))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }
}

/// Check `payload` against [`BOOK_SCHEMA`].
pub fn validate_book(payload: &Value) -> Result<(), ValidationError> {
    let violations = match payload {
        Value::Object(fields) => object_violations(fields),
        other => vec![Violation::new(
            BODY_FIELD,
            format!("must be a JSON object, got {}", json_type(other)),
        )],
    };

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn object_violations(fields: &Map<String, Value>) -> Vec<Violation> {
    let mut violations = Vec::new();

    for &(name, expected) in BOOK_SCHEMA {
        match fields.get(name) {
            None => violations.push(Violation::new(name, "is required")),
            Some(value) => {
                if let Some(error) = expected.check(value) {
                    violations.push(Violation::new(name, error));
                }
            }
        }
    }

    for name in fields.keys() {
        if !BOOK_SCHEMA.iter().any(|(known, _)| known == name) {
            violations.push(Violation::new(name.as_str(), "is not a recognised field"));
        }
    }

    violations
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() => "integer",
        Value::Number(n) if n.is_u64() => "out-of-range integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "isbn": "456",
            "amazon_url": "http://a.co/eobPtX3",
            "author": "Test Author 2",
            "language": "english",
            "pages": 350,
            "publisher": "Test Publisher 2",
            "title": "Test Title 2",
            "year": 2012
        })
    }

    fn fields_of(err: &ValidationError) -> Vec<&str> {
        err.violations().iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn accepts_complete_payload() {
        assert!(validate_book(&valid_payload()).is_ok());
    }

    #[test]
    fn empty_object_reports_every_field() {
        let err = validate_book(&json!({})).unwrap_err();
        let expected: Vec<&str> = BOOK_SCHEMA.iter().map(|(name, _)| *name).collect();

        assert_eq!(fields_of(&err), expected);
        assert!(err
            .violations()
            .iter()
            .all(|violation| violation.error == "is required"));
    }

    #[test]
    fn each_missing_field_is_reported() {
        for &(name, _) in BOOK_SCHEMA {
            let mut payload = valid_payload();
            payload.as_object_mut().unwrap().remove(name);

            let err = validate_book(&payload).unwrap_err();
            assert_eq!(fields_of(&err), vec![name], "removing {name}");
        }
    }

    #[test]
    fn type_mismatches_are_reported() {
        let cases = [
            ("pages", json!("350"), "must be an integer, got string"),
            ("year", Value::Null, "must be an integer, got null"),
            ("isbn", json!(456), "must be a string, got integer"),
            ("author", json!(true), "must be a string, got boolean"),
            ("pages", json!(350.5), "must be an integer, got number"),
            ("title", json!(["a"]), "must be a string, got array"),
            ("amazon_url", json!("not a uri"), "must be a URI"),
            ("amazon_url", json!("a.co/eobPtX3"), "must be a URI"),
            ("amazon_url", json!(42), "must be a URI, got integer"),
            ("isbn", json!(""), "must not be empty"),
        ];

        for (field, value, message) in cases {
            let mut payload = valid_payload();
            payload[field] = value;

            let err = validate_book(&payload).unwrap_err();
            assert_eq!(
                err.violations(),
                &[Violation::new(field, message)],
                "field {field}"
            );
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut payload = valid_payload();
        payload["edition"] = json!("first");

        let err = validate_book(&payload).unwrap_err();
        assert_eq!(
            err.violations(),
            &[Violation::new("edition", "is not a recognised field")]
        );
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = validate_book(&json!([valid_payload()])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid book payload: body: must be a JSON object, got array"
        );
    }

    #[test]
    fn whitespace_isbn_is_accepted() {
        let mut payload = valid_payload();
        payload["isbn"] = json!(" ");
        assert!(validate_book(&payload).is_ok());
    }

    #[test]
    fn payload_with_repeated_key_fails_to_parse() {
        let err = serde_json::from_str::<BookPayload>(r#"{"isbn": "1", "isbn": "2"}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate field `isbn`"), "{err}");
    }

    #[test]
    fn payload_keeps_non_object_bodies() {
        let BookPayload(value) = serde_json::from_str(r#"[1, "two", null]"#).unwrap();
        assert_eq!(value, json!([1, "two", null]));

        let BookPayload(value) =
            serde_json::from_str(r#"{"title": {"a": 1}, "pages": 3.5}"#).unwrap();
        assert_eq!(value, json!({"title": {"a": 1}, "pages": 3.5}));
    }

    #[test]
    fn violations_are_collected_together() {
        let err = validate_book(&json!({"isbn": 1, "pages": "many"})).unwrap_err();
        assert_eq!(err.violations().len(), BOOK_SCHEMA.len());
        assert!(err.to_string().starts_with("invalid book payload: isbn: must be a string"));
    }

    #[test]
    fn converts_into_validation_app_error() {
        let err = validate_book(&json!({})).unwrap_err();
        match AppError::from(err) {
            AppError::Validation { details, code, message, .. } => {
                assert_eq!(code, "validation_error");
                assert_eq!(details.len(), BOOK_SCHEMA.len());
                assert_eq!(details[0], json!({"field": "isbn", "error": "is required"}));
                assert!(message.starts_with("invalid book payload: isbn: is required"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
