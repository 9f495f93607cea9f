//! # Argument Binder
//!
//! Builds a handler's argument list from its declared parameters.
//!
//! Every parameter carries one [`Capability`] chosen at registration. Binding walks the
//! list in order and resolves each entry with a closed `match`:
//!
//! 1. `Request`, `Session`, `Response` hand over the live objects
//! 2. `File` and `Files` hand over uploaded multipart parts
//! 3. `Query`, `Header`, `Attribute`, `Body` and `PathVariable` read text from the
//!    request and convert it to the parameter's declared [`Shape`]
//! 4. `Unbound` parameters are always absent
//!
//! A value that fails conversion is the client's fault ([`BindingError::Conversion`],
//! answered with 400). Everything else that can go wrong here is a registration
//! mistake and is answered with 500.

use crate::router::{RouteError, RouteMatch};
use crate::server::{Request, Response, UploadedFile};
use crate::session::{SessionHandle, SessionStore};
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};
use std::fmt;

/// Target type for a scalar parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    Integer,
    Float,
    Boolean,
    /// Parsed as a JSON document
    Json,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Text => "text",
            Shape::Integer => "integer",
            Shape::Float => "float",
            Shape::Boolean => "boolean",
            Shape::Json => "json",
        };
        f.write_str(name)
    }
}

/// Where a parameter's value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Request,
    Session,
    Response,
    /// Uploaded file by form field name
    File(String),
    Files,
    Query(String),
    /// Header by exact name
    Header(String),
    /// Form attribute
    Attribute(String),
    Body,
    PathVariable(String),
    Unbound,
}

/// One declared handler parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub capability: Capability,
    pub shape: Shape,
}

impl ParamSpec {
    fn of(capability: Capability, shape: Shape) -> Self {
        Self { capability, shape }
    }

    #[must_use]
    pub fn request() -> Self {
        Self::of(Capability::Request, Shape::Text)
    }

    #[must_use]
    pub fn session() -> Self {
        Self::of(Capability::Session, Shape::Text)
    }

    #[must_use]
    pub fn response() -> Self {
        Self::of(Capability::Response, Shape::Text)
    }

    #[must_use]
    pub fn file(field_name: impl Into<String>) -> Self {
        Self::of(Capability::File(field_name.into()), Shape::Text)
    }

    #[must_use]
    pub fn files() -> Self {
        Self::of(Capability::Files, Shape::Text)
    }

    #[must_use]
    pub fn query(key: impl Into<String>, shape: Shape) -> Self {
        Self::of(Capability::Query(key.into()), shape)
    }

    #[must_use]
    pub fn header(name: impl Into<String>, shape: Shape) -> Self {
        Self::of(Capability::Header(name.into()), shape)
    }

    #[must_use]
    pub fn attribute(name: impl Into<String>, shape: Shape) -> Self {
        Self::of(Capability::Attribute(name.into()), shape)
    }

    #[must_use]
    pub fn body(shape: Shape) -> Self {
        Self::of(Capability::Body, shape)
    }

    #[must_use]
    pub fn path(name: impl Into<String>, shape: Shape) -> Self {
        Self::of(Capability::PathVariable(name.into()), shape)
    }

    #[must_use]
    pub fn unbound() -> Self {
        Self::of(Capability::Unbound, Shape::Text)
    }
}

#[derive(Debug)]
pub enum BindingError {
    /// Text could not be converted to the declared shape
    Conversion {
        source: String,
        shape: Shape,
        value: String,
        reason: String,
    },
    /// The matched route has no value for a declared path variable
    MissingPathVariable(String),
    /// More than one parameter asked for the response
    DuplicateResponse,
    Route(RouteError),
    /// `Args` accessed at a position of the wrong kind
    WrongKind { index: usize, expected: &'static str },
}

impl BindingError {
    /// `true` when the request itself is at fault
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, BindingError::Conversion { .. })
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversion {
                source,
                shape,
                value,
                reason,
            } => write!(f, "cannot convert {source} value {value:?} to {shape}: {reason}"),
            Self::MissingPathVariable(name) => write!(f, "no value for path variable {name}"),
            Self::DuplicateResponse => write!(f, "handler declares more than one response"),
            Self::Route(e) => write!(f, "{e}"),
            Self::WrongKind { index, expected } => {
                write!(f, "argument {index} is not a {expected}")
            }
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Route(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RouteError> for BindingError {
    fn from(e: RouteError) -> Self {
        Self::Route(e)
    }
}

/// A bound argument
pub enum Arg<'a> {
    Request(&'a Request),
    Session(Option<SessionHandle>),
    Response(&'a mut Response),
    File(Option<&'a UploadedFile>),
    Files(&'a [UploadedFile]),
    Value(Option<Value>),
    Absent,
}

impl fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Request(r) => write!(f, "Request({} {})", r.method, r.path),
            Arg::Session(s) => write!(f, "Session(present: {})", s.is_some()),
            Arg::Response(_) => write!(f, "Response"),
            Arg::File(file) => write!(f, "File({:?})", file.map(|x| &x.file_name)),
            Arg::Files(files) => write!(f, "Files({})", files.len()),
            Arg::Value(v) => write!(f, "Value({v:?})"),
            Arg::Absent => write!(f, "Absent"),
        }
    }
}

/// Bound arguments in declaration order, read by position.
#[derive(Debug)]
pub struct Args<'a> {
    args: Vec<Arg<'a>>,
}

impl<'a> Args<'a> {
    #[must_use]
    pub fn new(args: Vec<Arg<'a>>) -> Self {
        Self { args }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arg<'a>> {
        self.args.get(index)
    }

    #[must_use]
    pub fn request(&self, index: usize) -> Option<&Request> {
        match self.args.get(index) {
            Some(Arg::Request(r)) => Some(*r),
            _ => None,
        }
    }

    pub fn response(&mut self, index: usize) -> Option<&mut Response> {
        match self.args.get_mut(index) {
            Some(Arg::Response(r)) => Some(&mut **r),
            _ => None,
        }
    }

    #[must_use]
    pub fn session(&self, index: usize) -> Option<SessionHandle> {
        match self.args.get(index) {
            Some(Arg::Session(s)) => s.clone(),
            _ => None,
        }
    }

    #[must_use]
    pub fn file(&self, index: usize) -> Option<&UploadedFile> {
        match self.args.get(index) {
            Some(Arg::File(f)) => *f,
            _ => None,
        }
    }

    #[must_use]
    pub fn files(&self, index: usize) -> &[UploadedFile] {
        match self.args.get(index) {
            Some(Arg::Files(files)) => *files,
            _ => &[],
        }
    }

    /// Converted scalar at `index`
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&Value> {
        match self.args.get(index) {
            Some(Arg::Value(v)) => v.as_ref(),
            _ => None,
        }
    }

    /// Text value at `index`; `None` for absent or non-text values
    #[must_use]
    pub fn text(&self, index: usize) -> Option<&str> {
        self.raw(index).and_then(Value::as_str)
    }

    /// Deserialize the value at `index` into `T`.
    ///
    /// # Errors
    ///
    /// [`BindingError::WrongKind`] when the position does not hold a value,
    /// [`BindingError::Conversion`] when it does not fit `T`.
    pub fn value<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, BindingError> {
        let value = match self.args.get(index) {
            Some(Arg::Value(v)) => v,
            Some(Arg::Absent) => return Ok(None),
            _ => {
                return Err(BindingError::WrongKind {
                    index,
                    expected: "value",
                })
            }
        };
        value
            .as_ref()
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| BindingError::Conversion {
                    source: format!("argument {index}"),
                    shape: Shape::Json,
                    value: v.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

/// Bind every parameter of the matched route.
///
/// # Errors
///
/// Any [`BindingError`]; see the module docs for which are client errors.
pub fn bind<'a>(
    route_match: &RouteMatch,
    request: &'a Request,
    sessions: &SessionStore,
    response: &'a mut Response,
) -> Result<Args<'a>, BindingError> {
    let params = route_match.route.params();
    let mut response = Some(response);
    let mut args = Vec::with_capacity(params.len());

    for spec in params {
        let arg = match &spec.capability {
            Capability::Request => Arg::Request(request),
            Capability::Session => {
                Arg::Session(request.session_id().and_then(|id| sessions.lookup(id)))
            }
            Capability::Response => {
                Arg::Response(response.take().ok_or(BindingError::DuplicateResponse)?)
            }
            Capability::File(name) => Arg::File(request.file(name)),
            Capability::Files => Arg::Files(&request.files),
            Capability::Query(key) => {
                Arg::Value(convert_opt("query parameter", request.query_param(key), spec.shape)?)
            }
            Capability::Header(name) => {
                Arg::Value(convert_opt("header", request.header(name), spec.shape)?)
            }
            Capability::Attribute(name) => {
                Arg::Value(convert_opt("attribute", request.attribute(name), spec.shape)?)
            }
            Capability::Body => Arg::Value(convert_opt(
                "body",
                request.body.as_deref().filter(|b| !b.is_empty()),
                spec.shape,
            )?),
            Capability::PathVariable(name) => {
                let params = route_match.path_params()?;
                let value = params
                    .iter()
                    .find(|(k, _)| k.as_ref() == name)
                    .map(|(_, v)| v.as_str())
                    .ok_or_else(|| BindingError::MissingPathVariable(name.clone()))?;
                Arg::Value(Some(convert("path variable", value, spec.shape)?))
            }
            Capability::Unbound => Arg::Absent,
        };
        args.push(arg);
    }
    Ok(Args::new(args))
}

fn convert_opt(
    source: &str,
    text: Option<&str>,
    shape: Shape,
) -> Result<Option<Value>, BindingError> {
    text.map(|t| convert(source, t, shape)).transpose()
}

/// Convert request text to `shape`.
///
/// # Errors
///
/// [`BindingError::Conversion`] when the text does not parse.
pub fn convert(source: &str, text: &str, shape: Shape) -> Result<Value, BindingError> {
    let fail = |reason: String| BindingError::Conversion {
        source: source.to_string(),
        shape,
        value: text.to_string(),
        reason,
    };
    match shape {
        Shape::Text => Ok(Value::String(text.to_string())),
        Shape::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| fail(e.to_string())),
        Shape::Float => {
            let f = text.trim().parse::<f64>().map_err(|e| fail(e.to_string()))?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| fail("not a finite number".to_string()))
        }
        Shape::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(fail("expected true or false".to_string())),
        },
        Shape::Json => serde_json::from_str(text).map_err(|e| fail(e.to_string())),
    }
}
