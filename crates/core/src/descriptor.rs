//! Request descriptors: immutable templates for one remote operation.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{CredentialsMode, Method, Pipeline};

/// A descriptor that cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("'{operation}': endpoint must not be empty")]
    EmptyEndpoint { operation: String },

    /// A field name appears in both the default params and the default body,
    /// so the partition rule would be ambiguous for it.
    #[error("'{operation}': field '{field}' is declared as both a query parameter and a body field")]
    OverlappingField { operation: String, field: String },

    #[error("'{operation}': {method} requests cannot declare a default body")]
    BodyOnReadMethod { operation: String, method: Method },
}

/// Template for one logical remote operation.
///
/// A descriptor is built once (in code or from a catalog file), validated on
/// registration, and only ever read afterwards. Every call works on its own
/// merged copy of the defaults.
///
/// Catalog files use the following keys:
///
/// ```json
/// {
///   "url": "https://api.example.com/x/feed",
///   "method": "get",
///   "params": { "pn": 1, "ps": 10 },
///   "body": null,
///   "headers": { "Content-Type": "application/x-www-form-urlencoded" },
///   "credentials": "include",
///   "useCookie": true,
///   "pipeline": ["parse_json", "identity"]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Descriptor {
    #[serde(rename = "url")]
    endpoint: String,

    #[serde(default = "default_method")]
    method: Method,

    #[serde(default)]
    credentials: Option<CredentialsMode>,

    #[serde(default)]
    headers: BTreeMap<String, String>,

    #[serde(default, rename = "params")]
    default_params: Map<String, Value>,

    #[serde(default, rename = "body")]
    default_body: Option<Map<String, Value>>,

    #[serde(default = "default_true", rename = "useCookie")]
    use_credential_jar: bool,

    #[serde(default)]
    pipeline: Pipeline,
}

fn default_method() -> Method {
    Method::Get
}

fn default_true() -> bool {
    true
}

impl Descriptor {
    /// Creates a descriptor with no defaults, credential-jar injection enabled,
    /// and the [`Pipeline::json_data`] pipeline.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            credentials: None,
            headers: BTreeMap::new(),
            default_params: Map::new(),
            default_body: None,
            use_credential_jar: true,
            pipeline: Pipeline::default(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_params.insert(key.into(), value.into());
        self
    }

    pub fn with_body_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_body
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, mode: CredentialsMode) -> Self {
        self.credentials = Some(mode);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Opts out of per-caller credential injection ("guest" requests).
    pub fn without_credential_jar(mut self) -> Self {
        self.use_credential_jar = false;
        self
    }

    // -- accessors ----------------------------------------------------------

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn credentials(&self) -> Option<CredentialsMode> {
        self.credentials
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Looks a header up by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn default_params(&self) -> &Map<String, Value> {
        &self.default_params
    }

    pub fn default_body(&self) -> Option<&Map<String, Value>> {
        self.default_body.as_ref()
    }

    /// Whether a caller-supplied field with this name belongs in the body.
    pub fn governs_body_field(&self, key: &str) -> bool {
        self.default_body
            .as_ref()
            .is_some_and(|body| body.contains_key(key))
    }

    pub fn use_credential_jar(&self) -> bool {
        self.use_credential_jar
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Checks the invariants a registered descriptor must hold.
    ///
    /// # Errors
    ///
    /// See [`DescriptorError`].
    pub fn validate(&self, operation: &str) -> Result<(), DescriptorError> {
        if self.endpoint.is_empty() {
            return Err(DescriptorError::EmptyEndpoint {
                operation: operation.to_string(),
            });
        }
        let Some(body) = &self.default_body else {
            return Ok(());
        };
        if self.method.is_read() {
            return Err(DescriptorError::BodyOnReadMethod {
                operation: operation.to_string(),
                method: self.method,
            });
        }
        if let Some(field) = body.keys().find(|k| self.default_params.contains_key(*k)) {
            return Err(DescriptorError::OverlappingField {
                operation: operation.to_string(),
                field: field.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn catalog_entry_deserializes_with_defaults() {
        let descriptor: Descriptor = serde_json::from_value(json!({
            "url": "https://api.bilibili.com/x/web-interface/popular/series/one",
            "params": { "number": 1 }
        }))
        .unwrap();

        assert_eq!(descriptor.method(), Method::Get);
        assert!(descriptor.use_credential_jar());
        assert_eq!(descriptor.default_params()["number"], json!(1));
        assert!(descriptor.default_body().is_none());
        assert!(!descriptor.pipeline().ends_in_deliver());
    }

    #[test]
    fn catalog_entry_reads_every_key() {
        let descriptor: Descriptor = serde_json::from_value(json!({
            "url": "https://api.example.com/x/relation/modify",
            "method": "POST",
            "credentials": "include",
            "headers": { "Content-Type": "application/x-www-form-urlencoded" },
            "body": { "fid": 0, "act": 1 },
            "useCookie": false,
            "pipeline": ["parse_json", "deliver"]
        }))
        .unwrap();

        assert_eq!(descriptor.method(), Method::Post);
        assert_eq!(descriptor.credentials(), Some(CredentialsMode::Include));
        assert_eq!(
            descriptor.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert!(descriptor.governs_body_field("fid"));
        assert!(!descriptor.governs_body_field("csrf"));
        assert!(!descriptor.use_credential_jar());
        assert!(descriptor.pipeline().ends_in_deliver());
    }

    #[test]
    fn unknown_catalog_keys_are_rejected() {
        let result = serde_json::from_value::<Descriptor>(json!({
            "url": "https://api.example.com",
            "afterHandle": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_body_on_read_method() {
        let descriptor = Descriptor::get("https://api.example.com").with_body_field("a", 1);
        assert!(matches!(
            descriptor.validate("op"),
            Err(DescriptorError::BodyOnReadMethod { .. })
        ));
    }

    #[test]
    fn validate_rejects_field_governed_twice() {
        let descriptor = Descriptor::post("https://api.example.com")
            .with_param("csrf", "")
            .with_body_field("csrf", "");
        assert_eq!(
            descriptor.validate("op"),
            Err(DescriptorError::OverlappingField {
                operation: "op".into(),
                field: "csrf".into()
            })
        );
    }

    #[test]
    fn validate_rejects_empty_endpoint() {
        assert!(Descriptor::get("").validate("op").is_err());
        assert!(Descriptor::get("https://api.example.com")
            .validate("op")
            .is_ok());
    }
}
