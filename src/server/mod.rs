//! # Server Module
//!
//! Everything between the socket and the dispatcher.
//!
//! - [`codec`] decodes requests from a byte stream and writes responses back
//! - [`multipart`] splits `multipart/form-data` bodies into fields and files
//! - [`request`] / [`response`] are the data model both sides share
//! - [`service`] runs the sequential decode, dispatch, encode loop for one connection
//! - [`http_server`] accepts connections and gives each its own `may` coroutine
//!
//! A connection is served strictly in order: the next request is not decoded until
//! the previous response has been written. A decode failure drops the connection
//! without a response.

pub mod codec;
pub mod http_server;
pub mod multipart;
pub mod request;
pub mod response;
pub mod service;

pub use codec::{encode, write_response, CodecConfig, DecodeError, Decoded, RequestDecoder};
pub use http_server::{HttpServer, ServerHandle};
pub use multipart::{MultipartError, UploadedFile};
pub use request::{parse_cookies, parse_urlencoded, Request};
pub use response::{Body, HeaderVec, Response, SetCookie, MAX_INLINE_HEADERS};
pub use service::AppService;
