//! Normalizes error bodies returned by the API and the auth server
//!
//! Three body shapes are known: OAuth-style `{error, error_description}`,
//! vendor `{error_code}`, and validation `{message, validationErrors}`.
//! Anything that is not a JSON object falls back to the transport message.

use serde_json::{Map, Value};

use crate::error::RequestFailure;

/// Decoded error payload of a failed response
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedError {
    Body(Map<String, Value>),
    /// The body was not decodable; holds the transport error message
    Raw(String),
}

/// Field-level validation details
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrors {
    Fields(Vec<(String, String)>),
    Message(String),
}

impl ParsedError {
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Body(body) => body.get(key),
            Self::Raw(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.field("error").and_then(Value::as_str)
    }

    pub fn error_description(&self) -> Option<&str> {
        self.field("error_description").and_then(Value::as_str)
    }

    /// `error_code` as text; numeric codes are accepted as well
    pub fn error_code(&self) -> Option<String> {
        self.field("error_code").and_then(scalar_text)
    }

    pub fn message(&self) -> Option<&str> {
        self.field("message").and_then(Value::as_str)
    }

    pub fn validation_errors(&self) -> Option<ValidationErrors> {
        match self.field("validationErrors")? {
            Value::Null => None,
            Value::Object(fields) => Some(ValidationErrors::Fields(
                fields
                    .iter()
                    .map(|(field, message)| (field.clone(), display_text(message)))
                    .collect(),
            )),
            Value::Array(items) => Some(ValidationErrors::Fields(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, message)| (index.to_string(), display_text(message)))
                    .collect(),
            )),
            other => Some(ValidationErrors::Message(display_text(other))),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Raw(message) => Some(message),
            Self::Body(_) => None,
        }
    }
}

/// Decodes the body of a failed response
pub fn parse_error(failure: &RequestFailure) -> ParsedError {
    match serde_json::from_str::<Value>(&failure.body) {
        Ok(Value::Object(body)) => ParsedError::Body(body),
        _ => ParsedError::Raw(failure.message.clone()),
    }
}

/// Extracts the vendor-specific `error_code` field, if present
pub fn get_error_code(failure: &RequestFailure) -> Option<String> {
    parse_error(failure).error_code()
}

/// Human-readable lines describing a failed response, in logging order
pub fn describe(failure: &RequestFailure) -> Vec<String> {
    let parsed = parse_error(failure);

    if let Some(error) = parsed.error() {
        let mut lines = vec![format!("Error: {error}")];
        if let Some(description) = parsed.error_description() {
            lines.push(format!("Description: {description}"));
        }
        return lines;
    }

    if let Some(message) = parsed.message() {
        let mut lines = vec![format!("Error: {message}")];
        match parsed.validation_errors() {
            Some(ValidationErrors::Fields(fields)) => {
                lines.extend(
                    fields
                        .into_iter()
                        .map(|(field, message)| format!("-- {field}: {message}")),
                );
            }
            Some(ValidationErrors::Message(message)) => lines.push(format!("-- {message}")),
            None => {}
        }
        return lines;
    }

    vec![format!("Error: {}", failure.message)]
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(display_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
