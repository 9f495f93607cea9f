//! # brrtserve
//!
//! **brrtserve** is a small coroutine-powered HTTP application server. It turns raw
//! request bytes into calls on ordinary Rust methods, binding each declared parameter
//! from the request, the session or the response under construction.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! - **[`pool`]** - Bounded connection pool with a single timeout-bounded retry,
//!   RAII release and explicit transactions
//! - **[`session`]** - Concurrent session store keyed by the `BRRTSESSIONID` cookie
//! - **[`server`]** - Request decoding (form, JSON, text, multipart), response encoding,
//!   the per-connection service loop and the `may` TCP listener
//! - **[`router`]** - Ordered route table; the first matching pattern wins
//! - **[`binder`]** - Capability-driven argument binding and scalar conversion
//! - **[`dispatcher`]** - Session bootstrap, resolution, invocation, exception handlers
//!   and error mapping
//! - **[`resources`]** - Project, packaged-default and static resource namespaces, plus
//!   the extension to MIME table
//! - **[`registry`]** - Handler instance provider
//! - **[`config`]**, **[`logging`]**, **[`cli`]** - The binary's ambient stack
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as HttpServer<br/>(may coroutine per connection)
//!     participant Codec as RequestDecoder
//!     participant Dispatcher
//!     participant Sessions as SessionStore
//!     participant Routes as RouteTable
//!     participant Binder
//!     participant Handler
//!
//!     Client->>Server: bytes
//!     Server->>Codec: decode()
//!     Codec-->>Server: Request
//!     Server->>Dispatcher: dispatch(request)
//!     Dispatcher->>Sessions: refresh or create
//!     Dispatcher->>Routes: resolve(path)
//!     alt No route
//!         Dispatcher-->>Server: project resource or 404
//!     end
//!     Dispatcher->>Binder: bind(route, request)
//!     Binder-->>Dispatcher: Args
//!     Dispatcher->>Handler: call(component, args)
//!     Handler-->>Dispatcher: Reply or error
//!     Dispatcher->>Dispatcher: exception handler (first match)
//!     Dispatcher-->>Server: Response
//!     Server->>Client: encoded response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brrtserve::binder::{ParamSpec, Shape};
//! use brrtserve::dispatcher::{Dispatcher, DispatcherConfig};
//! use brrtserve::registry::Components;
//! use brrtserve::router::{Route, RouteTable};
//! use brrtserve::server::{AppService, CodecConfig, HttpServer};
//! use brrtserve::session::SessionStore;
//! use http::Method;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! let mut routes = RouteTable::new();
//! routes.register(
//!     Route::new("/hello/{name}", &[Method::GET])
//!         .param(ParamSpec::path("name", Shape::Text))
//!         .handler(|_: &Greeter, args| Ok(json!({ "hello": args.text(0) }).into())),
//! )?;
//!
//! let mut components = Components::new();
//! components.register(Greeter);
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(routes),
//!     Arc::new(SessionStore::new()),
//!     Arc::new(components),
//!     DispatcherConfig::default(),
//! );
//! let service = AppService::new(Arc::new(dispatcher), CodecConfig::default());
//! HttpServer(service).start("0.0.0.0:8080")?.join();
//! ```
//!
//! ## Performance
//!
//! Each accepted connection is served by one `may` coroutine; requests on a connection
//! are handled strictly in sequence. The only suspension points in the core are socket
//! reads and the pool's bounded wait. Coroutine stack size is set from
//! `BRRTS_STACK_SIZE` (see [`config::RuntimeConfig`]).

pub mod binder;
pub mod cli;
pub mod config;
pub mod demo;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod pool;
pub mod registry;
pub mod resources;
pub mod router;
pub mod server;
pub mod session;

pub use error::ServeError;
pub use handler::{FileEntity, HandlerResult, Reply};
