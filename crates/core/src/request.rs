//! Request building: merging caller fields into a descriptor and issuing the call.
//!
//! ## Merge rule
//!
//! Each extra field is routed by a single test: if the descriptor's default
//! body declares the key, the field is body data; otherwise it is a query
//! parameter. Caller values override descriptor defaults on collision.
//!
//! ## Query strings
//!
//! A non-empty merged parameter map always appends `?` to the endpoint.
//! Parameters whose merged value is falsy (`null`, `false`, `0`, `""`) are
//! left out of the query string entirely, so `{ "rid": 0 }` sends no `rid`.
//! When every parameter is falsy the URL ends in a bare `?`.
//!
//! ## Bodies
//!
//! Read requests never carry a body. Write requests serialise the merged body
//! as a form (when the descriptor's `Content-Type` header names
//! `application/x-www-form-urlencoded`) or as a JSON document otherwise. A
//! JSON body is labelled `application/json` unless the descriptor declares
//! its own `Content-Type`.

use std::sync::Arc;

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::{
    CredentialJar, CredentialsMode, Descriptor, DispatchError, HttpTransport, Method, Payload,
    Reply, TransportError,
};

/// Header carrying an explicitly injected credential jar.
///
/// Used instead of `Cookie` because the network layer manages that header
/// itself from the ambient store, which is not the caller's store.
pub const CREDENTIAL_HEADER: &str = "firefox-multi-account-cookie";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The merged request could not be serialised.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to encode query string: {0}")]
    Query(#[source] serde_urlencoded::ser::Error),

    #[error("failed to encode form body: {0}")]
    Form(#[source] serde_urlencoded::ser::Error),

    #[error("failed to encode JSON body: {0}")]
    Json(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Per-call union of descriptor defaults and caller fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRequest {
    pub params: Map<String, Value>,
    pub body: Map<String, Value>,
}

impl MergedRequest {
    /// Folds `extra` into the descriptor's defaults.
    ///
    /// The descriptor is only read; the result owns independent copies.
    pub fn merge(descriptor: &Descriptor, extra: &Map<String, Value>) -> Self {
        let mut params = descriptor.default_params().clone();
        let mut body = descriptor.default_body().cloned().unwrap_or_default();
        for (key, value) in extra {
            if descriptor.governs_body_field(key) {
                body.insert(key.clone(), value.clone());
            } else {
                params.insert(key.clone(), value.clone());
            }
        }
        Self { params, body }
    }

    /// Encodes the truthy parameters. `None` when there are no parameters at all.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Query`] if encoding fails.
    pub fn query_string(&self) -> Result<Option<String>, BuildError> {
        if self.params.is_empty() {
            return Ok(None);
        }
        let pairs: Vec<(&str, String)> = self
            .params
            .iter()
            .filter(|(_, value)| is_truthy(value))
            .map(|(key, value)| (key.as_str(), script_string(value)))
            .collect();
        serde_urlencoded::to_string(pairs)
            .map(Some)
            .map_err(BuildError::Query)
    }

    fn encode_body(&self, form: bool) -> Result<RequestBody, BuildError> {
        if form {
            let pairs: Vec<(&str, String)> = self
                .body
                .iter()
                .map(|(key, value)| (key.as_str(), script_string(value)))
                .collect();
            serde_urlencoded::to_string(pairs)
                .map(RequestBody::Form)
                .map_err(BuildError::Form)
        } else {
            serde_json::to_string(&self.body)
                .map(RequestBody::Json)
                .map_err(BuildError::Json)
        }
    }
}

/// Truthiness as a script engine sees it: `null`, `false`, zero, NaN and the
/// empty string are falsy; arrays and objects are always truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String conversion as a script engine performs it for form and query values.
fn script_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => script_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn number_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(float_string).unwrap_or_default()
    }
}

/// Positional notation between `1e-6` and `1e21`, exponent notation outside
/// it (`1e+21`, `1e-7`). Negative zero prints as `0`.
fn float_string(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if (1e-6..1e21).contains(&magnitude) {
        // Display drops a zero fraction ("3" rather than "3.0").
        return f.to_string();
    }
    let exponential = format!("{f:e}");
    match exponential.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exponential,
    }
}

// ---------------------------------------------------------------------------
// Prepared request
// ---------------------------------------------------------------------------

/// An encoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `key=value&...` form encoding.
    Form(String),
    /// A JSON document.
    Json(String),
}

impl RequestBody {
    pub fn as_str(&self) -> &str {
        match self {
            RequestBody::Form(s) | RequestBody::Json(s) => s,
        }
    }
}

/// A concrete network request ready for an [`HttpTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub credentials: Option<CredentialsMode>,
    /// Always `None` for read methods.
    pub body: Option<RequestBody>,
}

impl PreparedRequest {
    /// Looks a header up by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Merges `extra` into `descriptor` and encodes the result.
///
/// When `jar` is supplied its entries are attached under [`CREDENTIAL_HEADER`].
///
/// # Errors
///
/// Returns a [`BuildError`] if the query string or body cannot be encoded.
pub fn build_request(
    descriptor: &Descriptor,
    extra: &Map<String, Value>,
    jar: Option<&CredentialJar>,
) -> Result<PreparedRequest, BuildError> {
    let merged = MergedRequest::merge(descriptor, extra);

    let mut url = descriptor.endpoint().to_string();
    if let Some(query) = merged.query_string()? {
        url.push('?');
        url.push_str(&query);
    }

    let body = if descriptor.method().is_read() {
        None
    } else {
        let form = descriptor
            .header("Content-Type")
            .is_some_and(|ct| ct.contains(FORM_CONTENT_TYPE));
        Some(merged.encode_body(form)?)
    };

    let mut headers: Vec<(String, String)> = descriptor
        .headers()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if matches!(body, Some(RequestBody::Json(_))) && descriptor.header("Content-Type").is_none() {
        headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
    }
    if let Some(jar) = jar {
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(CREDENTIAL_HEADER));
        headers.push((CREDENTIAL_HEADER.to_string(), jar.header_value()));
    }

    Ok(PreparedRequest {
        method: descriptor.method(),
        url,
        headers,
        credentials: descriptor.credentials(),
        body,
    })
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Builds requests, sends them, and runs the descriptor's pipeline over the response.
#[derive(Clone)]
pub struct RequestBuilder {
    transport: Arc<dyn HttpTransport>,
}

impl RequestBuilder {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Best-effort execution: any failure is logged and yields `None`.
    ///
    /// `None` is also returned when the pipeline delivered its value through
    /// `reply`.
    pub async fn send(
        &self,
        descriptor: &Descriptor,
        extra: &Map<String, Value>,
        jar: Option<&CredentialJar>,
        reply: Option<&Reply>,
    ) -> Option<Value> {
        match self.try_send(descriptor, extra, jar, reply).await {
            Ok(out) => out.map(Payload::into_value),
            Err(e) => {
                tracing::error!(
                    kind = %e.kind(),
                    error = %e,
                    url = descriptor.endpoint(),
                    "request failed"
                );
                None
            }
        }
    }

    /// Like [`RequestBuilder::send`], but reports the failure.
    ///
    /// # Errors
    ///
    /// Build, transport (including non-2xx status) and pipeline failures.
    pub async fn try_send(
        &self,
        descriptor: &Descriptor,
        extra: &Map<String, Value>,
        jar: Option<&CredentialJar>,
        reply: Option<&Reply>,
    ) -> Result<Option<Payload>, DispatchError> {
        let request = build_request(descriptor, extra, jar)?;
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            has_body = request.body.is_some(),
            credential_header = jar.is_some(),
            "sending request"
        );

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
            }
            .into());
        }
        tracing::debug!(status = response.status, bytes = response.body.len(), "response received");

        Ok(descriptor
            .pipeline()
            .run(Payload::Response(response), reply)
            .await?)
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::FakeTransport;
    use crate::{Credential, Pipeline};

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn caller_value_overrides_default_param() {
        let descriptor = Descriptor::get("https://api.example.com/series/one").with_param("number", 1);
        let request = build_request(&descriptor, &fields(json!({ "number": 3 })), None).unwrap();
        assert_eq!(request.url, "https://api.example.com/series/one?number=3");
    }

    #[test]
    fn params_keep_declaration_order_and_append_extras() {
        let descriptor = Descriptor::get("https://api.example.com/region")
            .with_param("pn", 1)
            .with_param("ps", 10)
            .with_param("rid", 231);
        let request =
            build_request(&descriptor, &fields(json!({ "rid": 17, "web_location": "333.1" })), None)
                .unwrap();
        assert_eq!(
            request.url,
            "https://api.example.com/region?pn=1&ps=10&rid=17&web_location=333.1"
        );
    }

    #[test]
    fn falsy_params_are_omitted_from_the_query() {
        let descriptor = Descriptor::get("https://api.example.com/feed").with_param("rid", 231);
        let request = build_request(
            &descriptor,
            &fields(json!({ "rid": 0, "keyword": "", "offset": null, "hot": false, "pn": 2 })),
            None,
        )
        .unwrap();
        assert_eq!(request.url, "https://api.example.com/feed?pn=2");
    }

    #[test]
    fn all_falsy_params_leave_a_bare_question_mark() {
        let descriptor = Descriptor::get("https://api.example.com/feed").with_param("rid", 0);
        let request = build_request(&descriptor, &Map::new(), None).unwrap();
        assert_eq!(request.url, "https://api.example.com/feed?");
    }

    #[test]
    fn no_params_leave_the_endpoint_untouched() {
        let descriptor = Descriptor::get("https://api.example.com/series/");
        let request = build_request(&descriptor, &Map::new(), None).unwrap();
        assert_eq!(request.url, "https://api.example.com/series/");
    }

    #[test]
    fn query_values_are_stringified_and_encoded() {
        let descriptor = Descriptor::get("https://api.example.com/search");
        let request = build_request(
            &descriptor,
            &fields(json!({ "q": "a b&c", "ratio": 1.5, "whole": 3.0, "ids": [1, 2], "on": true })),
            None,
        )
        .unwrap();
        assert_eq!(
            request.url,
            "https://api.example.com/search?q=a+b%26c&ratio=1.5&whole=3&ids=1%2C2&on=true"
        );
    }

    #[test]
    fn extreme_numbers_use_exponent_notation() {
        let descriptor = Descriptor::post("https://api.example.com/modify")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body_field("neg", -0.0)
            .with_body_field("big", 1e21)
            .with_body_field("tiny", 1e-7)
            .with_body_field("edge", 1e-6);
        let request = build_request(
            &descriptor,
            &fields(json!({ "id": 1e21, "small": 2.5e-8, "zero": -0.0 })),
            None,
        )
        .unwrap();
        assert_eq!(
            request.body,
            Some(RequestBody::Form(
                "neg=0&big=1e%2B21&tiny=1e-7&edge=0.000001".to_string()
            ))
        );
        assert_eq!(
            request.url,
            "https://api.example.com/modify?id=1e%2B21&small=2.5e-8"
        );
        assert_eq!(float_string(-1.5e22), "-1.5e+22");
        assert_eq!(float_string(123456.75), "123456.75");
    }

    #[test]
    fn read_requests_never_carry_a_body() {
        let descriptor = Descriptor::get("https://api.example.com/feed");
        let request =
            build_request(&descriptor, &fields(json!({ "body": { "x": 1 }, "y": 2 })), None).unwrap();
        assert!(request.body.is_none());
    }

    #[test]
    fn body_keys_route_caller_fields_into_the_body() {
        let descriptor = Descriptor::post("https://api.example.com/modify")
            .with_param("platform", "web")
            .with_body_field("fid", 0)
            .with_body_field("act", 1);
        let request =
            build_request(&descriptor, &fields(json!({ "fid": 42, "csrf": "tok" })), None).unwrap();

        assert_eq!(
            request.url,
            "https://api.example.com/modify?platform=web&csrf=tok"
        );
        assert_eq!(
            request.body,
            Some(RequestBody::Json(r#"{"fid":42,"act":1}"#.to_string()))
        );
    }

    #[test]
    fn form_content_type_selects_form_encoding() {
        let descriptor = Descriptor::post("https://api.example.com/modify")
            .with_header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
            .with_body_field("x", 0)
            .with_body_field("y", 0);
        let request = build_request(&descriptor, &fields(json!({ "x": 1, "y": 2 })), None).unwrap();
        assert_eq!(request.body, Some(RequestBody::Form("x=1&y=2".to_string())));
    }

    #[test]
    fn json_is_the_default_body_encoding() {
        let descriptor = Descriptor::post("https://api.example.com/modify")
            .with_body_field("x", 0)
            .with_body_field("y", 0);
        let request = build_request(&descriptor, &fields(json!({ "x": 1, "y": 2 })), None).unwrap();
        assert_eq!(request.body, Some(RequestBody::Json(r#"{"x":1,"y":2}"#.to_string())));
        assert_eq!(request.header("content-type"), Some("application/json"));
    }

    #[test]
    fn declared_content_type_is_not_overridden() {
        let descriptor = Descriptor::post("https://api.example.com/modify")
            .with_header("content-type", "text/plain;charset=UTF-8");
        let request = build_request(&descriptor, &Map::new(), None).unwrap();
        let declared: Vec<_> = request
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
            .collect();
        assert_eq!(declared.len(), 1);
        assert_eq!(request.header("Content-Type"), Some("text/plain;charset=UTF-8"));
    }

    #[test]
    fn read_requests_get_no_content_type() {
        let request = build_request(&Descriptor::get("https://api.example.com/feed"), &Map::new(), None)
            .unwrap();
        assert!(request.header("Content-Type").is_none());
    }

    #[test]
    fn form_bodies_keep_falsy_values() {
        let descriptor = Descriptor::post("https://api.example.com/modify")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body_field("act", 0)
            .with_body_field("re_src", Value::Null);
        let request = build_request(&descriptor, &Map::new(), None).unwrap();
        assert_eq!(
            request.body,
            Some(RequestBody::Form("act=0&re_src=null".to_string()))
        );
    }

    #[test]
    fn write_without_body_defaults_sends_empty_document() {
        let descriptor = Descriptor::post("https://api.example.com/ping");
        let request = build_request(&descriptor, &Map::new(), None).unwrap();
        assert_eq!(request.body, Some(RequestBody::Json("{}".to_string())));
    }

    #[test]
    fn jar_is_attached_under_the_credential_header() {
        let descriptor = Descriptor::get("https://api.example.com/feed")
            .with_header("Referer", "https://www.example.com/");
        let jar = CredentialJar::new(vec![
            Credential::new("SESSDATA", "abc"),
            Credential::new("buvid3", "xyz"),
        ]);
        let request = build_request(&descriptor, &Map::new(), Some(&jar)).unwrap();

        assert_eq!(request.header(CREDENTIAL_HEADER), Some("SESSDATA=abc; buvid3=xyz"));
        assert_eq!(request.header("referer"), Some("https://www.example.com/"));
        assert!(descriptor.header(CREDENTIAL_HEADER).is_none());
    }

    #[test]
    fn merge_leaves_descriptor_defaults_untouched() {
        let descriptor = Descriptor::get("https://api.example.com/feed").with_param("pn", 1);
        let merged = MergedRequest::merge(&descriptor, &fields(json!({ "pn": 9 })));
        assert_eq!(merged.params["pn"], json!(9));
        assert_eq!(descriptor.default_params()["pn"], json!(1));
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_failure() {
        let transport = Arc::new(FakeTransport::new().respond(503, "{}"));
        let builder = RequestBuilder::new(transport);
        let (reply, _rx) = Reply::channel();

        let err = builder
            .try_send(
                &Descriptor::get("https://api.example.com/feed").with_pipeline(Pipeline::json_deliver()),
                &Map::new(),
                None,
                Some(&reply),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Transport(TransportError::Status { status: 503 })
        ));
        assert!(!reply.is_spent());
    }

    #[tokio::test]
    async fn send_resolves_with_pipeline_output() {
        let transport = Arc::new(FakeTransport::new().respond(200, r#"{"code":0}"#));
        let builder = RequestBuilder::new(transport.clone());

        let out = builder
            .send(&Descriptor::get("https://api.example.com/feed"), &Map::new(), None, None)
            .await;

        assert_eq!(out, Some(json!({ "code": 0 })));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn send_swallows_network_failures() {
        let transport = Arc::new(FakeTransport::new().fail_with("connection refused"));
        let builder = RequestBuilder::new(transport);
        let out = builder
            .send(&Descriptor::get("https://api.example.com/feed"), &Map::new(), None, None)
            .await;
        assert!(out.is_none());
    }
}
