use super::multipart::UploadedFile;
use crate::ids::RequestId;
use crate::router::ParamVec;
use crate::session::SESSION_COOKIE;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// A decoded HTTP request.
///
/// Produced by [`RequestDecoder`](super::RequestDecoder) and owned by the connection
/// coroutine that read it. Only the decoder (while building it) and the dispatcher
/// (when injecting a freshly minted session cookie) mutate it.
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    /// HTTP method token
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Protocol version token, e.g. `HTTP/1.1`
    pub version: String,
    /// Query string parameters in arrival order (first occurrence wins on lookup)
    pub query_params: ParamVec,
    /// Headers with case-sensitive keys, excluding `Cookie`
    pub headers: HashMap<String, String>,
    /// Cookies parsed from the `Cookie` header
    pub cookies: HashMap<String, String>,
    /// Form fields from urlencoded or multipart bodies
    pub attributes: HashMap<String, String>,
    /// Raw body text for `text/plain` and `application/json` bodies
    pub body: Option<String>,
    /// File parts from a multipart body
    pub files: Vec<UploadedFile>,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            version: version.into(),
            query_params: ParamVec::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            attributes: HashMap::new(),
            body: None,
            files: Vec::new(),
        }
    }

    /// Get a query parameter by name
    ///
    /// Uses "first occurrence wins" semantics: for `?limit=10&limit=20` this
    /// returns `10`.
    #[inline]
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Record a query parameter unless one with the same name already exists.
    pub fn add_query_param(&mut self, name: &str, value: String) {
        if self.query_param(name).is_none() {
            self.query_params.push((Arc::from(name), value));
        }
    }

    /// Exact-case header lookup
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Case-insensitive header lookup (RFC 7230 semantics)
    #[must_use]
    pub fn header_ignore_case(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Record a form attribute unless one with the same name already exists.
    pub fn add_attribute(&mut self, name: String, value: String) {
        self.attributes.entry(name).or_insert(value);
    }

    /// Session id presented by the client, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.cookie(SESSION_COOKIE)
    }

    /// Uploaded file by its form field name
    #[must_use]
    pub fn file(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }

    /// `true` unless the client asked to close or spoke HTTP/1.0
    #[must_use]
    pub fn wants_keep_alive(&self) -> bool {
        let close = self
            .header_ignore_case("Connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"));
        self.version == "HTTP/1.1" && !close
    }
}

/// Parse a `Cookie` header value into name/value pairs.
///
/// Entries are separated by `;`; each is split on its first `=` and both halves are
/// trimmed. Entries without `=` are skipped.
#[must_use]
pub fn parse_cookies(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parse an urlencoded `k=v&k2=v2` string.
///
/// Percent and `+` decoding follow `application/x-www-form-urlencoded`; a key without
/// `=` maps to an empty value. Duplicates are returned in arrival order.
#[must_use]
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
