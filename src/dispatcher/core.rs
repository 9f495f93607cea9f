use super::exception::ExceptionHandler;
use crate::binder::bind;
use crate::error::ServeError;
use crate::handler::{HandlerResult, Reply};
use crate::registry::InstanceProvider;
use crate::resources::{content_type_for, EmbeddedResources, ResourceResolver};
use crate::router::{RouteMatch, RouteTable};
use crate::server::{Body, Request, Response, SetCookie};
use crate::server::response::JSON_CONTENT_TYPE;
use crate::session::{SessionStore, SESSION_COOKIE};
use anyhow::anyhow;
use serde_json::json;
use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-request progress, logged at `debug` on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Received,
    SessionResolved,
    Routed,
    Bound,
    Invoked,
    Responded,
    NotFound,
    Faulted,
}

impl DispatchPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchPhase::Received => "received",
            DispatchPhase::SessionResolved => "session_resolved",
            DispatchPhase::Routed => "routed",
            DispatchPhase::Bound => "bound",
            DispatchPhase::Invoked => "invoked",
            DispatchPhase::Responded => "responded",
            DispatchPhase::NotFound => "not_found",
            DispatchPhase::Faulted => "faulted",
        }
    }
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Served for `/`, looked up in the project then the packaged namespace
    pub index_page: String,
    /// Prefix routed to the static namespace, e.g. `/static/`
    pub static_prefix: Option<String>,
    /// Session cookie lifetime
    pub session_timeout_ms: u64,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            index_page: "index.html".to_string(),
            static_prefix: Some("/static/".to_string()),
            session_timeout_ms: 1_800_000,
            secure_cookies: false,
        }
    }
}

/// Turns a decoded [`Request`] into a [`Response`].
///
/// Owns no per-request state; one instance is shared by every connection.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    sessions: Arc<SessionStore>,
    instances: Arc<dyn InstanceProvider>,
    exception_handlers: Vec<ExceptionHandler>,
    project: Option<Arc<dyn ResourceResolver>>,
    defaults: Arc<dyn ResourceResolver>,
    static_files: Option<Arc<dyn ResourceResolver>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RouteTable>,
        sessions: Arc<SessionStore>,
        instances: Arc<dyn InstanceProvider>,
        config: DispatcherConfig,
    ) -> Self {
        info!(
            routes = routes.len(),
            index_page = %config.index_page,
            static_prefix = ?config.static_prefix,
            session_timeout_ms = config.session_timeout_ms,
            "Dispatcher created"
        );
        Self {
            routes,
            sessions,
            instances,
            exception_handlers: Vec::new(),
            project: None,
            defaults: Arc::new(EmbeddedResources::packaged_defaults()),
            static_files: None,
            config,
        }
    }

    /// Append an exception handler. Earlier registrations take precedence.
    pub fn add_exception_handler(&mut self, handler: ExceptionHandler) {
        debug!(
            owner = handler.owner_name(),
            position = self.exception_handlers.len(),
            "Exception handler registered"
        );
        self.exception_handlers.push(handler);
    }

    pub fn set_project_resources(&mut self, resolver: Arc<dyn ResourceResolver>) {
        self.project = Some(resolver);
    }

    pub fn set_default_resources(&mut self, resolver: Arc<dyn ResourceResolver>) {
        self.defaults = resolver;
    }

    pub fn set_static_resources(&mut self, resolver: Arc<dyn ResourceResolver>) {
        self.static_files = Some(resolver);
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Handle one request. Never fails: every error becomes a status code.
    pub fn dispatch(&self, mut req: Request) -> Response {
        let started = Instant::now();
        let mut res = Response::new(req.version.clone());
        self.phase(&req, DispatchPhase::Received);

        self.resolve_session(&mut req, &mut res);
        self.phase(&req, DispatchPhase::SessionResolved);

        match self.route(&req, &mut res) {
            Ok(()) => self.phase(&req, DispatchPhase::Responded),
            Err(e) => self.fail(&req, &mut res, &e),
        }

        debug!(
            request_id = %req.request_id,
            status = res.status,
            duration_us = started.elapsed().as_micros() as u64,
            "Dispatch complete"
        );
        res
    }

    /// Response for `/favicon.ico`: project namespace, then the packaged default.
    #[must_use]
    pub fn favicon_response(&self, version: &str) -> Response {
        let mut res = Response::new(version);
        if let Err(e) = self.serve_favicon(&mut res) {
            write_error(&mut res, &e, "/favicon.ico");
        }
        res
    }

    fn phase(&self, req: &Request, phase: DispatchPhase) {
        debug!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            phase = phase.as_str(),
            "Dispatch phase"
        );
    }

    /// Refresh the presented session, or mint one and hand it to both sides.
    fn resolve_session(&self, req: &mut Request, res: &mut Response) {
        if let Some(id) = req.session_id() {
            if self.sessions.refresh(id) {
                return;
            }
            debug!(request_id = %req.request_id, "Unknown session id presented - issuing a new one");
        }
        let (id, _) = self.sessions.create();
        res.add_cookie(
            SetCookie::new(SESSION_COOKIE, id.clone())
                .max_age(self.config.session_timeout_ms / 1000)
                .secure(self.config.secure_cookies),
        );
        req.cookies.insert(SESSION_COOKIE.to_string(), id);
    }

    fn route(&self, req: &Request, res: &mut Response) -> Result<(), ServeError> {
        let path = req.path.as_str();

        if path == "/" {
            let index = format!("/{}", self.config.index_page.trim_start_matches('/'));
            let bytes = self.lookup_with_default(&index)?;
            self.phase(req, DispatchPhase::Routed);
            serve_bytes(res, &index, bytes);
            return Ok(());
        }

        if path == "/favicon.ico" {
            self.phase(req, DispatchPhase::Routed);
            return self.serve_favicon(res);
        }

        if let (Some(prefix), Some(static_files)) = (&self.config.static_prefix, &self.static_files)
        {
            if path.starts_with(prefix.as_str()) {
                // keep the leading '/' of the remainder
                let rest = &path[prefix.trim_end_matches('/').len()..];
                self.phase(req, DispatchPhase::Routed);
                let bytes = found(static_files.lookup(rest))?.ok_or(ServeError::NotFound)?;
                serve_bytes(res, rest, bytes);
                return Ok(());
            }
        }

        if let Some(route_match) = self.routes.resolve(path) {
            self.phase(req, DispatchPhase::Routed);
            if !route_match.route.accepts(&req.method) {
                return Err(ServeError::MethodNotAllowed {
                    allowed: route_match.route.methods().to_vec(),
                });
            }
            return self.invoke(&route_match, req, res);
        }

        if let Some(project) = &self.project {
            if let Some(bytes) = found(project.lookup(path))? {
                self.phase(req, DispatchPhase::Routed);
                serve_bytes(res, path, bytes);
                return Ok(());
            }
        }
        Err(ServeError::NotFound)
    }

    fn serve_favicon(&self, res: &mut Response) -> Result<(), ServeError> {
        let bytes = self.lookup_with_default("/favicon.ico")?;
        serve_bytes(res, "/favicon.ico", bytes);
        Ok(())
    }

    /// Project namespace first, then exactly one step to the packaged defaults.
    fn lookup_with_default(&self, path: &str) -> Result<Vec<u8>, ServeError> {
        if let Some(project) = &self.project {
            if let Some(bytes) = found(project.lookup(path))? {
                return Ok(bytes);
            }
        }
        found(self.defaults.lookup(path))?.ok_or(ServeError::NotFound)
    }

    fn invoke(
        &self,
        route_match: &RouteMatch,
        req: &Request,
        res: &mut Response,
    ) -> Result<(), ServeError> {
        let route = &route_match.route;
        let owner = self.instances.instance(route.owner()).ok_or_else(|| {
            ServeError::Handler(anyhow!("no instance registered for {}", route.owner_name()))
        })?;

        let result = {
            let mut args = bind(route_match, req, &self.sessions, res)?;
            self.phase(req, DispatchPhase::Bound);
            let handler = route.handler();
            catch_unwind(AssertUnwindSafe(|| handler(owner.as_ref(), &mut args)))
        };

        let result = match result {
            Ok(result) => result,
            Err(panic) => {
                let panic_message = panic_message(panic.as_ref());
                error!(
                    request_id = %req.request_id,
                    route = %route.pattern(),
                    owner = route.owner_name(),
                    panic_message = %panic_message,
                    "Handler panicked"
                );
                Err(anyhow!("handler panicked: {panic_message}"))
            }
        };
        self.phase(req, DispatchPhase::Invoked);

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => self.handle_exception(req, err)?,
        };
        apply_reply(res, reply);
        Ok(())
    }

    /// Give the first matching exception handler one chance to replace `err`.
    fn handle_exception(&self, req: &Request, err: anyhow::Error) -> Result<Reply, ServeError> {
        let Some(handler) = self.exception_handlers.iter().find(|h| h.matches(&err)) else {
            return Err(ServeError::Handler(err));
        };
        debug!(
            request_id = %req.request_id,
            error = %err,
            exception_handler = handler.owner_name(),
            "Handler error intercepted"
        );
        let owner = self.instances.instance(handler.owner()).ok_or_else(|| {
            ServeError::Handler(anyhow!(
                "no instance registered for {}",
                handler.owner_name()
            ))
        })?;
        let outcome: HandlerResult =
            catch_unwind(AssertUnwindSafe(|| handler.invoke(owner.as_ref(), &err))).unwrap_or_else(
                |panic| {
                    Err(anyhow!(
                        "exception handler panicked: {}",
                        panic_message(panic.as_ref())
                    ))
                },
            );
        outcome.map_err(ServeError::Handler)
    }

    fn fail(&self, req: &Request, res: &mut Response, err: &ServeError) {
        let status = err.status();
        if status >= 500 {
            self.phase(req, DispatchPhase::Faulted);
            error!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = status,
                error = %err,
                "Request failed"
            );
        } else if status == 404 {
            self.phase(req, DispatchPhase::NotFound);
        } else {
            warn!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = status,
                error = %err,
                "Request rejected"
            );
        }
        write_error(res, err, &req.path);
    }
}

/// `Ok(None)` for a plain miss; other I/O errors are faults.
fn found(result: io::Result<Vec<u8>>) -> Result<Option<Vec<u8>>, ServeError> {
    match result {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ServeError::Handler(e.into())),
    }
}

fn serve_bytes(res: &mut Response, path: &str, bytes: Vec<u8>) {
    res.set_status(200);
    res.set_content_type(content_type_for(path));
    res.set_body(Body::Bytes(bytes));
}

fn apply_reply(res: &mut Response, reply: Reply) {
    let untouched = res.content_type == JSON_CONTENT_TYPE;
    match reply {
        Reply::Value(value) => {
            if untouched && value.is_string() {
                res.set_content_type("text/plain; charset=utf-8");
            }
            res.set_body(Body::Value(value));
        }
        Reply::Bytes(bytes) => {
            if untouched {
                res.set_content_type("application/octet-stream");
            }
            res.set_body(Body::Bytes(bytes));
        }
        Reply::File(file) => {
            res.set_header("Content-Disposition", format!("filename={}", file.file_name));
            res.set_content_type("application/octet-stream");
            res.set_body(Body::Stream(file.reader));
        }
        Reply::Empty => {}
    }
}

/// Replace whatever the handler produced with an error body. Cookies survive so a
/// freshly issued session still reaches the client.
fn write_error(res: &mut Response, err: &ServeError, path: &str) {
    let status = err.status();
    res.headers.clear();
    res.set_status(status);
    res.set_content_type(JSON_CONTENT_TYPE);
    let body = match err {
        ServeError::NotFound => json!({ "error": "Not Found", "path": path }),
        ServeError::MethodNotAllowed { allowed } => {
            let allowed: Vec<&str> = allowed.iter().map(http::Method::as_str).collect();
            res.set_header("Allow", allowed.join(", "));
            json!({ "error": "Method Not Allowed", "path": path, "allowed": allowed })
        }
        _ if status == 400 => json!({ "error": "Bad Request", "detail": err.to_string() }),
        _ => json!({ "error": "Internal Server Error" }),
    };
    res.set_body(Body::Value(body));
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
