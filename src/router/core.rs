use crate::binder::{Args, Capability, ParamSpec};
use crate::handler::{erase, HandlerFn, HandlerResult};
use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum number of path/query parameters before heap allocation.
/// Most routes have ≤4 path variables (e.g., /users/{id}/posts/{postId}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage.
///
/// Param names use `Arc<str>`: path variable names come from the route table and are
/// shared across every match; values are per-request data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{([^}]+)\}").expect("placeholder regex is valid")
});

#[derive(Debug)]
pub enum RouteError {
    /// The compiled pattern is not a valid regex
    InvalidPattern { pattern: String, reason: String },
    /// A parameter names a path variable the pattern does not declare
    UnknownPathVariable { pattern: String, name: String },
    /// Capture groups and placeholder names disagree in number
    PathVariableMismatch {
        pattern: String,
        names: usize,
        captures: usize,
    },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern {pattern}: {reason}")
            }
            Self::UnknownPathVariable { pattern, name } => {
                write!(f, "route {pattern} has no path variable {{{name}}}")
            }
            Self::PathVariableMismatch {
                pattern,
                names,
                captures,
            } => write!(
                f,
                "route {pattern} declares {names} path variables but matched {captures}"
            ),
        }
    }
}

impl std::error::Error for RouteError {}

/// Convert a path pattern to an anchored regex and its ordered placeholder names.
///
/// `/users/{id}/posts/{postId}` becomes `^/users/([^/]+)/posts/([^/]+)$` with
/// names `["id", "postId"]`. Literal text is escaped.
///
/// # Errors
///
/// [`RouteError::InvalidPattern`] when the result does not compile.
pub fn path_to_regex(pattern: &str) -> Result<(Regex, Vec<String>), RouteError> {
    let mut source = String::with_capacity(pattern.len() + 16);
    source.push('^');
    let mut names = Vec::new();
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        source.push_str(&regex::escape(&pattern[last..whole.start()]));
        source.push_str("([^/]+)");
        names.push(name.as_str().to_string());
        last = whole.end();
    }
    source.push_str(&regex::escape(&pattern[last..]));
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok((regex, names))
}

/// A route before compilation. Built with [`Route::new`].
pub struct RouteDef {
    pattern: String,
    methods: Vec<Method>,
    params: Vec<ParamSpec>,
    owner: TypeId,
    owner_name: &'static str,
    handler: HandlerFn,
}

/// Builder returned by [`Route::new`]; finished by [`RouteBuilder::handler`].
pub struct RouteBuilder {
    pattern: String,
    methods: Vec<Method>,
    params: Vec<ParamSpec>,
}

impl RouteBuilder {
    /// Declare the next handler parameter. Order matters: it is the argument position.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Attach the handler, a method on component `C`.
    pub fn handler<C, F>(self, f: F) -> RouteDef
    where
        C: Any + Send + Sync,
        F: Fn(&C, &mut Args<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        RouteDef {
            pattern: self.pattern,
            methods: self.methods,
            params: self.params,
            owner: TypeId::of::<C>(),
            owner_name: type_name::<C>(),
            handler: erase::<C, F>(f),
        }
    }
}

/// A compiled route descriptor
pub struct Route {
    pattern: String,
    methods: Vec<Method>,
    params: Vec<ParamSpec>,
    owner: TypeId,
    owner_name: &'static str,
    handler: HandlerFn,
    regex: Regex,
    names: Vec<String>,
}

impl Route {
    /// Start describing a route on `pattern` accepting `methods`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(pattern: impl Into<String>, methods: &[Method]) -> RouteBuilder {
        RouteBuilder {
            pattern: pattern.into(),
            methods: methods.to_vec(),
            params: Vec::new(),
        }
    }

    fn compile(def: RouteDef) -> Result<Self, RouteError> {
        let (regex, names) = path_to_regex(&def.pattern)?;
        for spec in &def.params {
            if let Capability::PathVariable(name) = &spec.capability {
                if !names.contains(name) {
                    return Err(RouteError::UnknownPathVariable {
                        pattern: def.pattern,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            pattern: def.pattern,
            methods: def.methods,
            params: def.params,
            owner: def.owner,
            owner_name: def.owner_name,
            handler: def.handler,
            regex,
            names,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Type of the component the handler is a method of
    #[must_use]
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    #[must_use]
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    #[must_use]
    pub fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    #[must_use]
    pub fn path_variable_names(&self) -> &[String] {
        &self.names
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("owner", &self.owner_name)
            .field("params", &self.params.len())
            .finish()
    }
}

/// Result of resolving a path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Capture group values in pattern order
    pub captures: SmallVec<[String; MAX_INLINE_PARAMS]>,
}

impl RouteMatch {
    /// Zip placeholder names with the captured values.
    ///
    /// # Errors
    ///
    /// [`RouteError::PathVariableMismatch`] when the counts differ.
    pub fn path_params(&self) -> Result<ParamVec, RouteError> {
        let names = self.route.path_variable_names();
        if names.len() != self.captures.len() {
            return Err(RouteError::PathVariableMismatch {
                pattern: self.route.pattern.clone(),
                names: names.len(),
                captures: self.captures.len(),
            });
        }
        Ok(names
            .iter()
            .zip(&self.captures)
            .map(|(name, value)| (Arc::from(name.as_str()), value.clone()))
            .collect())
    }

    /// Captured value of one path variable
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        let index = self
            .route
            .path_variable_names()
            .iter()
            .position(|n| n == name)?;
        self.captures.get(index).map(String::as_str)
    }
}

/// Ordered route table. First registered full match wins; there is no specificity
/// sorting, so an earlier `/item/{id}` shadows a later `/item/special`.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append a route.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] or [`RouteError::UnknownPathVariable`].
    pub fn register(&mut self, def: RouteDef) -> Result<(), RouteError> {
        let route = Route::compile(def)?;
        info!(
            pattern = %route.pattern,
            methods = ?route.methods,
            owner = route.owner_name,
            params = route.params.len(),
            position = self.routes.len(),
            "Route registered"
        );
        self.routes.push(Arc::new(route));
        Ok(())
    }

    /// First route whose pattern fully matches `path`
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        for route in &self.routes {
            if let Some(caps) = route.regex.captures(path) {
                let captures = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_string())
                    .collect();
                debug!(path = %path, pattern = %route.pattern, "Route matched");
                return Some(RouteMatch {
                    route: Arc::clone(route),
                    captures,
                });
            }
        }
        debug!(path = %path, "No route matched");
        None
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// One line per route, in resolution order
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| {
                let methods: Vec<&str> = r.methods.iter().map(Method::as_str).collect();
                format!("[route] {} {} -> {}", methods.join(","), r.pattern, r.owner_name)
            })
            .collect()
    }
}
