//! Field-level validation messages from a rejected form submission.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages keyed by the field they belong to.
///
/// The auth API answers a bad submission with a JSON object such as
///
/// ```json
/// { "username": ["A user with that username already exists."],
///   "detail": "No active account found with the given credentials" }
/// ```
///
/// Each value is normalized to a list of strings. Form-level messages sit
/// under `detail` or `non_field_errors`; see [`FieldErrors::detail`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Parses an error response body.
    ///
    /// Anything that is not a JSON object (an HTML error page, plain
    /// text) yields an empty set. Raw response prose never reaches the
    /// user this way.
    pub fn from_body(body: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };

        let fields = object
            .into_iter()
            .filter_map(|(field, value)| {
                let messages = messages(value);
                (!messages.is_empty()).then_some((field, messages))
            })
            .collect();
        Self(fields)
    }

    /// Adds one message for `field`.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Messages for `field`, empty if none.
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// The first form-level message: `detail`, else `non_field_errors`.
    pub fn detail(&self) -> Option<&str> {
        ["detail", "non_field_errors"]
            .iter()
            .find_map(|key| self.get(key).first())
            .map(String::as_str)
    }

    /// `": <messages>"`, or nothing when there are none. Appended to
    /// error messages.
    pub fn as_suffix(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(": {self}")
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in self.iter() {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{field}: {message}")?;
            }
        }
        Ok(())
    }
}

/// Flattens one JSON value into messages. Nested objects are kept as
/// their JSON text so nothing the server said is silently lost.
fn messages(value: Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items.into_iter().flat_map(messages).collect(),
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body_lists_and_strings_normalized() {
        let fields = FieldErrors::from_body(
            r#"{"username":["taken","too short"],"detail":"No active account"}"#,
        );

        assert_eq!(fields.get("username"), ["taken", "too short"]);
        assert_eq!(fields.get("detail"), ["No active account"]);
        assert_eq!(fields.detail(), Some("No active account"));
    }

    #[test]
    fn test_from_body_non_field_errors_is_detail() {
        let fields =
            FieldErrors::from_body(r#"{"non_field_errors":["Unable to log in."]}"#);
        assert_eq!(fields.detail(), Some("Unable to log in."));
    }

    #[test]
    fn test_from_body_html_is_empty() {
        let fields = FieldErrors::from_body("<html><body>Bad Request</body></html>");
        assert!(fields.is_empty());
        assert_eq!(fields.detail(), None);
    }

    #[test]
    fn test_from_body_json_array_is_empty() {
        assert!(FieldErrors::from_body(r#"["nope"]"#).is_empty());
    }

    #[test]
    fn test_from_body_drops_null_and_keeps_numbers() {
        let fields = FieldErrors::from_body(r#"{"a":null,"code":401}"#);
        assert!(fields.get("a").is_empty());
        assert_eq!(fields.get("code"), ["401"]);
    }

    #[test]
    fn test_get_missing_field_is_empty() {
        assert!(FieldErrors::default().get("email").is_empty());
    }

    #[test]
    fn test_display_joins_messages() {
        let mut fields = FieldErrors::default();
        fields.push("password", "too short");
        fields.push("email", "invalid");
        assert_eq!(fields.to_string(), "email: invalid; password: too short");
    }

    #[test]
    fn test_as_suffix_empty_and_populated() {
        assert_eq!(FieldErrors::default().as_suffix(), "");

        let mut fields = FieldErrors::default();
        fields.push("detail", "nope");
        assert_eq!(fields.as_suffix(), ": detail: nope");
    }
}
