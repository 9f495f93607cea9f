//! # Router Module
//!
//! Ordered, regex-based path resolution for registered handlers.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling path patterns such as `/users/{id}` into anchored regexes
//! - Keeping routes in registration order and resolving a path to the first full match
//! - Extracting path variables positionally from the matched capture groups
//!
//! ## Architecture
//!
//! The router uses a two-phase approach:
//!
//! 1. **Compilation**: at registration, placeholders are extracted in order, the
//!    literal text between them is escaped and each placeholder becomes `([^/]+)`.
//!    A parameter that names an undeclared path variable is rejected here.
//!
//! 2. **Matching**: for each request the table tests the path against every compiled
//!    pattern in registration order and returns the first hit. There is no
//!    specificity sorting: `/item/{id}` registered before `/item/special` captures
//!    `/item/special`.
//!
//! Method checking is not done here. The dispatcher resolves by path first and answers
//! `405` when the resolved route does not accept the request method.
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtserve::binder::{ParamSpec, Shape};
//! use brrtserve::router::{Route, RouteTable};
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table.register(
//!     Route::new("/users/{id}", &[Method::GET])
//!         .param(ParamSpec::path("id", Shape::Integer))
//!         .handler(|users: &Users, args| users.show(args)),
//! )?;
//!
//! let m = table.resolve("/users/42").unwrap();
//! assert_eq!(m.path_param("id"), Some("42"));
//! ```

mod core;

pub use core::{
    path_to_regex, ParamVec, Route, RouteBuilder, RouteDef, RouteError, RouteMatch, RouteTable,
    MAX_INLINE_PARAMS,
};
