use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated response header storage, kept in insertion order.
///
/// Header names use `Arc<str>`: they are mostly static strings and repeated across
/// responses, so cloning them is an atomic increment rather than a copy.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Default content type for structured bodies
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Canonical reason phrase for a status code, `Unknown` when it has none.
pub(crate) fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}

/// A cookie to be emitted as a `Set-Cookie` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    /// Lifetime in seconds
    pub max_age: Option<u64>,
    pub secure: bool,
}

impl SetCookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            secure: false,
        }
    }

    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Response payload
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Structured value, serialized as JSON (or as plain text for a bare string)
    Value(Value),
    /// Unsized stream copied to the socket; the connection closes afterwards
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Value(v) => write!(f, "Value({v})"),
            Body::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

/// Response under construction for one request
#[derive(Debug)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: &'static str,
    pub content_type: String,
    /// Headers other than `Content-Type`, in insertion order
    pub headers: HeaderVec,
    pub cookies: Vec<SetCookie>,
    pub body: Body,
}

impl Response {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            status: 200,
            reason: status_reason(200),
            content_type: JSON_CONTENT_TYPE.to_string(),
            headers: HeaderVec::new(),
            cookies: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
        self.reason = status_reason(status);
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or update a header. An existing header keeps its position.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((Arc::from(name), value)),
        }
    }

    /// Queue a cookie; a later cookie with the same name replaces the earlier one.
    pub fn add_cookie(&mut self, cookie: SetCookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }
}
