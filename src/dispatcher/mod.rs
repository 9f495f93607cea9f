//! # Dispatcher Module
//!
//! Per-request control flow between the codec and the handlers.
//!
//! ## Overview
//!
//! For every decoded request the dispatcher:
//! - resolves the client's session, minting one (and its cookie) on first contact
//! - picks what answers the path: the index page, the favicon, the static namespace,
//!   a registered route, or the project namespace as the last resort
//! - rejects a route that does not accept the request method with `405`
//! - binds the handler's arguments and invokes it, catching panics
//! - gives the first matching [`ExceptionHandler`] one chance to replace an error
//! - maps whatever is left to a status code and fills in the response
//!
//! ## Request Flow
//!
//! ```text
//! Received → SessionResolved → Routed → Bound → Invoked → Responded
//!                                 ↘ NotFound        ↘ Faulted
//! ```
//!
//! Each transition is logged at `debug` with the phase name and the request id.
//!
//! ## Error Handling
//!
//! | Failure | Status |
//! |---|---|
//! | no route and no resource | 404 |
//! | route does not accept the method | 405 |
//! | argument text does not convert | 400 |
//! | anything else, including panics | 500 (generic body, details logged) |
//!
//! ## Resource Namespaces
//!
//! `/` and `/favicon.ico` look in the project namespace first and fall back to the
//! packaged defaults exactly once. The static namespace is consulted only for paths
//! under the static prefix. Other paths fall back to the project namespace when no
//! route matches, with no packaged default.

mod core;
mod exception;

pub use core::{DispatchPhase, Dispatcher, DispatcherConfig};
pub use exception::{ErrorMatcher, ExceptionHandler, ExceptionHandlerBuilder};
