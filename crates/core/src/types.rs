//! Shared value types for the dispatch domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structured values that flow through a request: the HTTP method and
//! credentials mode of a descriptor, the credential jar of a caller, the
//! identity of the caller itself, and the raw response handed to a pipeline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CookieStoreId, TabId};

// ---------------------------------------------------------------------------
// Request shape
// ---------------------------------------------------------------------------

/// HTTP method of a descriptor.
///
/// Parsed case-insensitively (`"get"`, `"GET"` and `"Get"` are equivalent).
/// Only [`Method::Get`] is a read method: it never carries a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns `true` for the read method. Read requests are sent without a body.
    pub fn is_read(self) -> bool {
        matches!(self, Method::Get)
    }

    /// Returns the canonical upper-case method token.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "delete" => Ok(Method::Delete),
            other => Err(format!("unsupported HTTP method '{other}'")),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for String {
    fn from(method: Method) -> String {
        method.as_str().to_string()
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// Whether the ambient credential store takes part in a request.
///
/// Mirrors the `credentials` option of a browser fetch. `None` on a descriptor
/// leaves the choice to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    /// Never send ambient credentials.
    Omit,
    /// Always send ambient credentials.
    Include,
    /// Send ambient credentials for same-origin requests only.
    SameOrigin,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// One stored credential (a cookie) as reported by the credential source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub value: String,
}

impl Credential {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered credentials belonging to one caller identity.
///
/// Fetched fresh for every request and never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialJar(Vec<Credential>);

impl CredentialJar {
    pub fn new(entries: Vec<Credential>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[Credential] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the jar as a single header value: `name=value` pairs joined by `"; "`.
    pub fn header_value(&self) -> String {
        self.0
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl FromIterator<Credential> for CredentialJar {
    fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The tab a message originated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    #[serde(default)]
    pub id: Option<TabId>,
    #[serde(default)]
    pub cookie_store_id: Option<CookieStoreId>,
}

/// Identity of the context that sent a message.
///
/// Shaped like a browser runtime message sender so it can be deserialised
/// directly from what the messaging layer reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    #[serde(default)]
    pub tab: Option<TabInfo>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CallerIdentity {
    /// A caller inside a tab bound to the given cookie store.
    pub fn in_store(tab_id: TabId, store: CookieStoreId) -> Self {
        Self {
            tab: Some(TabInfo {
                id: Some(tab_id),
                cookie_store_id: Some(store),
            }),
            url: None,
        }
    }

    pub fn tab_id(&self) -> Option<TabId> {
        self.tab.as_ref().and_then(|t| t.id)
    }

    /// The cookie store the caller's tab belongs to, when resolvable.
    pub fn cookie_store_id(&self) -> Option<&CookieStoreId> {
        self.tab.as_ref().and_then(|t| t.cookie_store_id.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// An unparsed network response, as returned by an [`crate::HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns `true` for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body parsed as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
